use unicode_ident::{is_xid_continue, is_xid_start};
use winnow::{
    ModalResult, Parser,
    ascii::{digit1, hex_digit1, oct_digit1},
    combinator::{alt, cut_err, fail, opt, preceded, repeat, separated_pair},
    error::{ParserError, StrContext, StrContextValue},
    stream::{AsChar, Compare, Stream, StreamIsPartial},
    token::{any, one_of, take_while},
};

use super::{Op, Slice};

pub fn op<'input>(input: &mut &'input str) -> ModalResult<Op<'input>> {
    alt((
        preceded("bit=", cut_err(write_bit)),
        preceded("range=", cut_err(write_range)),
        preceded("slice=", cut_err(write_slice)),
        preceded('?', cut_err(query)),
        set_field,
        fail.context(StrContext::Label("operation")),
    ))
    .parse_next(input)
}

fn write_bit<'input>(input: &mut &'input str) -> ModalResult<Op<'input>> {
    separated_pair(index, ':', bit_value)
        .map(|(bit, value)| Op::WriteBit { bit, value })
        .context(StrContext::Label("bit write"))
        .parse_next(input)
}

fn write_range<'input>(input: &mut &'input str) -> ModalResult<Op<'input>> {
    (index, ':', index, ':', int)
        .map(|(start, _, size, _, value)| Op::WriteRange { start, size, value })
        .context(StrContext::Label("range write"))
        .parse_next(input)
}

fn write_slice<'input>(input: &mut &'input str) -> ModalResult<Op<'input>> {
    separated_pair(slice, ':', int)
        .map(|(slice, value)| Op::WriteSlice(slice, value))
        .context(StrContext::Label("slice write"))
        .parse_next(input)
}

fn set_field<'input>(input: &mut &'input str) -> ModalResult<Op<'input>> {
    separated_pair(ident, '=', cut_err(int))
        .map(|(field, value)| Op::SetField(field, value))
        .parse_next(input)
}

fn query<'input>(input: &mut &'input str) -> ModalResult<Op<'input>> {
    alt((
        slice.map(Op::ReadSlice),
        ident.map(Op::GetField),
        fail.context(StrContext::Label("query"))
            .context(StrContext::Expected(StrContextValue::Description(
                "field name or bit slice",
            ))),
    ))
    .parse_next(input)
}

fn slice(input: &mut &str) -> ModalResult<Slice> {
    (opt(index), "..", opt(index))
        .map(|(start, _, stop)| Slice { start, stop })
        .parse_next(input)
}

fn ident<'input>(input: &mut &'input str) -> ModalResult<&'input str> {
    (
        any.verify(|&c: &char| c == '_' || is_xid_start(c)),
        take_while(.., |c: char| is_xid_continue(c)),
    )
        .take()
        .parse_next(input)
}

fn index(input: &mut &str) -> ModalResult<u32> {
    int.try_map(u32::try_from)
        .context(StrContext::Label("bit index"))
        .parse_next(input)
}

fn bit_value(input: &mut &str) -> ModalResult<u8> {
    int.try_map(u8::try_from)
        .context(StrContext::Label("bit value"))
        .parse_next(input)
}

pub fn int(input: &mut &str) -> ModalResult<u64> {
    int_radix
        .try_map(|(radix, digits)| u64::from_str_radix(&digits.replace('_', ""), radix.into()))
        .context(StrContext::Label("integer"))
        .parse_next(input)
}

#[derive(Debug, PartialEq, Clone, Copy)]
enum IntRadix {
    Bin,
    Oct,
    Dec,
    Hex,
}

impl From<IntRadix> for u32 {
    fn from(val: IntRadix) -> Self {
        match val {
            IntRadix::Bin => 2,
            IntRadix::Oct => 8,
            IntRadix::Dec => 10,
            IntRadix::Hex => 16,
        }
    }
}

fn int_radix<'input>(input: &mut &'input str) -> ModalResult<(IntRadix, &'input str)> {
    alt((
        bin_int_radix.map(|v| (IntRadix::Bin, v)),
        hex_int_radix.map(|v| (IntRadix::Hex, v)),
        oct_int_radix.map(|v| (IntRadix::Oct, v)),
        dec_int_radix.map(|v| (IntRadix::Dec, v)),
    ))
    .parse_next(input)
}

fn bin_int_radix<'input>(input: &mut &'input str) -> ModalResult<&'input str> {
    base_int_radix((alt(("0b", "0B")), one_of(b"01")), one_of(b"01"))
        .map(|v: &'input str| &v[2..])
        .parse_next(input)
}

fn oct_int_radix<'input>(input: &mut &'input str) -> ModalResult<&'input str> {
    base_int_radix((alt(("0o", "0O")), one_of('0'..='7')), oct_digit1)
        .map(|v: &'input str| &v[2..])
        .parse_next(input)
}

fn dec_int_radix<'input>(input: &mut &'input str) -> ModalResult<&'input str> {
    base_int_radix(one_of('0'..='9'), digit1).parse_next(input)
}

fn hex_int_radix<'input>(input: &mut &'input str) -> ModalResult<&'input str> {
    base_int_radix(
        (alt(("0x", "0X")), any.verify(|c: &char| c.is_hex_digit())),
        hex_digit1,
    )
    .map(|v: &'input str| &v[2..])
    .parse_next(input)
}

/// A prefix followed by digit groups, optionally separated by `_`.
fn base_int_radix<I, E, PrefixOutput, DigitOutput>(
    prefix: impl Parser<I, PrefixOutput, E>,
    digit: impl Parser<I, DigitOutput, E>,
) -> impl Parser<I, I::Slice, E>
where
    I: Stream + StreamIsPartial + Compare<char>,
    I::Token: AsChar + Clone,
    E: ParserError<I>,
{
    (prefix, repeat::<_, _, (), _, _>(.., (opt('_'), digit))).take()
}
