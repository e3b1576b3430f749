use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use itertools::Itertools;
use tracing::{debug, subscriber::set_global_default};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

use crate::{
    catalog::Catalog,
    op::{self, Op},
    register::Register,
};

/// Reads and writes the bits of a fixed-width register.
#[derive(Parser)]
#[command(version)]
pub struct Cli {
    #[arg(
        short,
        long,
        conflicts_with = "width",
        help = "Catalog register to instantiate, e.g. EAX"
    )]
    register: Option<String>,
    #[arg(
        short,
        long,
        default_value_t = 32,
        help = "Width of a generic register"
    )]
    width: u32,
    #[arg(long, default_value = "0", value_parser = op::parse_int, help = "Initial value")]
    value: u64,
    #[arg(short, long, value_enum, default_value_t = Format::Hex, help = "How values are printed")]
    format: Format,
    #[arg(help = "Operations applied in order: bit=N:V, range=START:SIZE:V, \
                  slice=START..STOP:V, FIELD=V, ?FIELD, ?START..STOP")]
    ops: Vec<String>,
}

impl Cli {
    pub fn run() -> Result<()> {
        let cli = Self::parse();
        setup_tracing()?;

        let catalog = Catalog::x86();
        let mut register = match &cli.register {
            Some(name) => catalog
                .register(name, cli.value)
                .with_context(|| format!("Failed to instantiate {name}"))?,
            None => Register::builder()
                .width(cli.width)
                .value(cli.value)
                .build()
                .context("Failed to create register")?,
        };
        debug!(%register, "register created");

        for text in &cli.ops {
            let op = Op::parse(text)
                .map_err(|err| anyhow!("{err}"))
                .with_context(|| format!("Invalid operation {text:?}"))?;

            let read = op
                .apply(&catalog, &mut register)
                .with_context(|| format!("Failed to apply {op}"))?;
            if let Some(value) = read {
                println!("{op} = {}", cli.format.render(value, register.width()));
            }
        }

        println!("{register}");
        if cli.format != Format::Hex {
            println!("{}", register.read_transformed(|v| cli.format.render(v, register.width())));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "lower")]
pub enum Format {
    Hex,
    Bin,
    Dec,
    All,
}

impl Format {
    pub fn render(self, value: u64, width: u32) -> String {
        match self {
            Format::Hex => format!("{value:#x}"),
            Format::Bin => grouped_bin(value, width),
            Format::Dec => value.to_string(),
            Format::All => format!("{value:#x} {} {value}", grouped_bin(value, width)),
        }
    }
}

/// Binary digits of a `width`-bit value in groups of four, e.g. `0b0011_1100_1000`.
fn grouped_bin(value: u64, width: u32) -> String {
    let digits = (width.div_ceil(4) * 4) as usize;
    let groups = format!("{value:0digits$b}")
        .chars()
        .chunks(4)
        .into_iter()
        .map(|group| group.collect::<String>())
        .join("_");
    format!("0b{groups}")
}

fn setup_tracing() -> Result<()> {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let sub = Registry::default()
        .with(EnvFilter::from_default_env())
        .with(fmt_layer);
    set_global_default(sub).context("Failed to set tracing subscriber")
}
