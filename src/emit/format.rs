//! Format-string instruction emitter (spec.md §4.12: a closed directive
//! set — `%Sx` for source operand `x`, `%Dx` for destination operand `x`,
//! `%C` for an immediate constant, `%M` for a memory operand, `%t` for a
//! jump target — with any other directive a panic, since an unrecognized
//! directive means the target table itself is wrong, a programming error
//! rather than something to recover from).

use std::fmt;

/// One operand a template directive can render.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Reg(&'static str),
    Imm(i64),
    Mem { base: &'static str, offset: i32 },
    Label(String),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(name) => write!(f, "{name}"),
            Operand::Imm(v) => write!(f, "{v}"),
            Operand::Mem { base, offset } => write!(f, "{offset}({base})"),
            Operand::Label(l) => write!(f, "{l}"),
        }
    }
}

/// One instruction ready to render: a template plus the operand slots its
/// directives index into.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EmitInstr {
    pub template: &'static str,
    pub sources: Vec<Operand>,
    pub dests: Vec<Operand>,
    pub constant: Option<i64>,
    pub memory: Option<Operand>,
    pub target: Option<String>,
}

/// Render `instr.template`, substituting each directive for its operand.
/// Panics on an index out of range or an unrecognized directive letter —
/// both mean the target's own instruction table is malformed.
#[must_use]
pub fn render(instr: &EmitInstr) -> String {
    let mut out = String::new();
    let mut chars = instr.template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('S') => {
                let idx = parse_index(&mut chars, instr.template);
                out.push_str(&instr.sources[idx].to_string());
            }
            Some('D') => {
                let idx = parse_index(&mut chars, instr.template);
                out.push_str(&instr.dests[idx].to_string());
            }
            Some('C') => {
                let c = instr.constant.unwrap_or_else(|| panic!("%C directive with no constant set in `{}`", instr.template));
                out.push_str(&c.to_string());
            }
            Some('M') => {
                let m = instr
                    .memory
                    .as_ref()
                    .unwrap_or_else(|| panic!("%M directive with no memory operand set in `{}`", instr.template));
                out.push_str(&m.to_string());
            }
            Some('t') => {
                let t = instr
                    .target
                    .as_deref()
                    .unwrap_or_else(|| panic!("%t directive with no jump target set in `{}`", instr.template));
                out.push_str(t);
            }
            Some(other) => panic!("unrecognized format directive %{other} in `{}`", instr.template),
            None => panic!("dangling % at end of format template `{}`", instr.template),
        }
    }
    out
}

fn parse_index(chars: &mut std::iter::Peekable<std::str::Chars>, template: &str) -> usize {
    let mut digits = String::new();
    while let Some(&d) = chars.peek() {
        if d.is_ascii_digit() {
            digits.push(d);
            chars.next();
        } else {
            break;
        }
    }
    digits
        .parse()
        .unwrap_or_else(|_| panic!("%S/%D directive missing its operand index in `{template}`"))
}
