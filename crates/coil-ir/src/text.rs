//! Canonical one-line textual form for IR statements and expressions.
//!
//! Formatting and parsing round-trip exactly: `parse(format(x)) == x` for
//! every constructible statement and expression. The grammar is consumed
//! by the external (de)serialization layer.

use smol_str::SmolStr;
use thiserror::Error;

use crate::pou::PouId;
use crate::stmt::{AddressBase, AddressElement, Expression, IrType, LocalVarOffset, Statement};

/// Textual-form parse errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum ParseError {
    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("expected {expected} at '{found}'")]
    Expected {
        expected: &'static str,
        found: SmolStr,
    },

    #[error("invalid number '{0}'")]
    InvalidNumber(SmolStr),

    #[error("invalid value size {0}")]
    InvalidSize(u16),

    #[error("trailing input '{0}'")]
    Trailing(SmolStr),
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Literal { bits, ty } => write!(f, "{bits}:{}", ty.byte_size()),
            Expression::LoadValue(offset) => write!(f, "{offset}"),
            Expression::Deref(offset) => write!(f, "*{offset}"),
            Expression::Address { base, elements } => {
                match base {
                    AddressBase::Stack(offset) => write!(f, "&{offset}")?,
                    AddressBase::Pointer(offset) => write!(f, "&*{offset}")?,
                }
                for element in elements {
                    match element {
                        AddressElement::FieldOffset(bytes) => write!(f, "+{bytes}")?,
                        AddressElement::CheckedIndex {
                            index,
                            lower,
                            upper,
                            element_size,
                        } => write!(f, "[{index} in {lower}..{upper} *{element_size}]")?,
                        AddressElement::UncheckedIndex {
                            index,
                            element_size,
                        } => write!(f, "[{index} *{element_size}]")?,
                    }
                }
                Ok(())
            }
        }
    }
}

impl std::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Statement::Comment(text) => write!(f, "# {text}"),
            Statement::Label(name) => write!(f, "{name}:"),
            Statement::Jump { target } => write!(f, "jump to {target}"),
            Statement::JumpIfNot { condition, target } => {
                write!(f, "if not {condition} jump to {target}")
            }
            Statement::Return => f.write_str("return"),
            Statement::WriteValue { value, dest, ty } => {
                write!(f, "copy{} {value} to {dest}", ty.byte_size())
            }
            Statement::WriteDerefValue { value, dest, ty } => {
                write!(f, "copy{} {value} to *{dest}", ty.byte_size())
            }
            Statement::StaticCall {
                callee,
                inputs,
                outputs,
            } => {
                write!(f, "call {callee}(")?;
                for (i, input) in inputs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{input}")?;
                }
                f.write_str(") => ")?;
                if let [single] = outputs.as_slice() {
                    write!(f, "{single}")
                } else {
                    f.write_str("(")?;
                    for (i, output) in outputs.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{output}")?;
                    }
                    f.write_str(")")
                }
            }
        }
    }
}

impl std::str::FromStr for Statement {
    type Err = ParseError;

    fn from_str(text: &str) -> Result<Self, ParseError> {
        let mut cursor = Cursor::new(text);
        let statement = cursor.statement()?;
        cursor.finish()?;
        Ok(statement)
    }
}

impl std::str::FromStr for Expression {
    type Err = ParseError;

    fn from_str(text: &str) -> Result<Self, ParseError> {
        let mut cursor = Cursor::new(text);
        let expression = cursor.expression()?;
        cursor.finish()?;
        Ok(expression)
    }
}

struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { rest: text }
    }

    fn finish(&self) -> Result<(), ParseError> {
        if self.rest.is_empty() {
            Ok(())
        } else {
            Err(ParseError::Trailing(SmolStr::new(self.rest)))
        }
    }

    fn eat(&mut self, prefix: &str) -> bool {
        if let Some(rest) = self.rest.strip_prefix(prefix) {
            self.rest = rest;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, prefix: &'static str) -> Result<(), ParseError> {
        if self.eat(prefix) {
            Ok(())
        } else if self.rest.is_empty() {
            Err(ParseError::UnexpectedEof)
        } else {
            Err(ParseError::Expected {
                expected: prefix,
                found: SmolStr::new(self.rest),
            })
        }
    }

    fn statement(&mut self) -> Result<Statement, ParseError> {
        if self.eat("# ") {
            let text = SmolStr::new(self.rest);
            self.rest = "";
            return Ok(Statement::Comment(text));
        }
        if self.eat("#") {
            let text = SmolStr::new(self.rest);
            self.rest = "";
            return Ok(Statement::Comment(text));
        }
        if self.eat("jump to ") {
            let target = self.name()?;
            return Ok(Statement::Jump { target });
        }
        if self.eat("if not ") {
            let condition = self.slot()?;
            self.expect(" jump to ")?;
            let target = self.name()?;
            return Ok(Statement::JumpIfNot { condition, target });
        }
        if self.rest == "return" {
            self.rest = "";
            return Ok(Statement::Return);
        }
        if self.eat("copy") {
            let ty = self.size()?;
            self.expect(" ")?;
            let value = self.expression()?;
            self.expect(" to ")?;
            let deref = self.eat("*");
            let dest = self.slot()?;
            return Ok(if deref {
                Statement::WriteDerefValue { value, dest, ty }
            } else {
                Statement::WriteValue { value, dest, ty }
            });
        }
        if self.eat("call ") {
            let callee = PouId::new(self.name()?);
            self.expect("(")?;
            let inputs = self.slot_list(")")?;
            self.expect(" => ")?;
            let outputs = if self.eat("(") {
                self.slot_list(")")?
            } else {
                vec![self.slot()?]
            };
            return Ok(Statement::StaticCall {
                callee,
                inputs,
                outputs,
            });
        }
        // Anything left must be a label definition: `name:`.
        let name = self.name()?;
        self.expect(":")?;
        Ok(Statement::Label(name))
    }

    fn expression(&mut self) -> Result<Expression, ParseError> {
        if self.eat("&") {
            let base = if self.eat("*") {
                AddressBase::Pointer(self.slot()?)
            } else {
                AddressBase::Stack(self.slot()?)
            };
            let mut elements = Vec::new();
            loop {
                if self.eat("+") {
                    elements.push(AddressElement::FieldOffset(self.number()?));
                } else if self.eat("[") {
                    let index = self.slot()?;
                    if self.eat(" in ") {
                        let lower = self.number::<i32>()?;
                        self.expect("..")?;
                        let upper = self.number::<i32>()?;
                        self.expect(" *")?;
                        let element_size = self.number()?;
                        self.expect("]")?;
                        elements.push(AddressElement::CheckedIndex {
                            index,
                            lower,
                            upper,
                            element_size,
                        });
                    } else {
                        self.expect(" *")?;
                        let element_size = self.number()?;
                        self.expect("]")?;
                        elements.push(AddressElement::UncheckedIndex {
                            index,
                            element_size,
                        });
                    }
                } else {
                    break;
                }
            }
            return Ok(Expression::Address { base, elements });
        }
        if self.eat("*") {
            return Ok(Expression::Deref(self.slot()?));
        }
        if self.rest.starts_with("stack") {
            return Ok(Expression::LoadValue(self.slot()?));
        }
        let bits = self.number::<u64>()?;
        self.expect(":")?;
        let ty = self.size()?;
        Ok(Expression::Literal { bits, ty })
    }

    fn slot(&mut self) -> Result<LocalVarOffset, ParseError> {
        self.expect("stack")?;
        Ok(LocalVarOffset(self.number()?))
    }

    fn slot_list(&mut self, terminator: &'static str) -> Result<Vec<LocalVarOffset>, ParseError> {
        let mut slots = Vec::new();
        if self.eat(terminator) {
            return Ok(slots);
        }
        loop {
            slots.push(self.slot()?);
            if self.eat(", ") {
                continue;
            }
            self.expect(terminator)?;
            return Ok(slots);
        }
    }

    fn size(&mut self) -> Result<IrType, ParseError> {
        let size = self.number::<u16>()?;
        IrType::from_byte_size(size).ok_or(ParseError::InvalidSize(size))
    }

    fn number<T: std::str::FromStr>(&mut self) -> Result<T, ParseError> {
        let negative = self.rest.starts_with('-');
        let digits = self
            .rest
            .char_indices()
            .skip(usize::from(negative))
            .find(|(_, c)| !c.is_ascii_digit())
            .map_or(self.rest.len(), |(i, _)| i);
        let (text, rest) = self.rest.split_at(digits);
        if text.is_empty() || text == "-" {
            return Err(ParseError::InvalidNumber(SmolStr::new(self.rest)));
        }
        let value = text
            .parse()
            .map_err(|_| ParseError::InvalidNumber(SmolStr::new(text)))?;
        self.rest = rest;
        Ok(value)
    }

    fn name(&mut self) -> Result<SmolStr, ParseError> {
        let end = self
            .rest
            .char_indices()
            .find(|(_, c)| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.')))
            .map_or(self.rest.len(), |(i, _)| i);
        if end == 0 {
            if self.rest.is_empty() {
                return Err(ParseError::UnexpectedEof);
            }
            return Err(ParseError::Expected {
                expected: "name",
                found: SmolStr::new(self.rest),
            });
        }
        let (name, rest) = self.rest.split_at(end);
        self.rest = rest;
        Ok(SmolStr::new(name))
    }
}
