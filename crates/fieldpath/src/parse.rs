use crate::{path::PathBuf, Element};
use peg::str::LineCol;
use serde_json::Value;

peg::parser! {
    pub grammar parser() for str {
        rule quoted_field() -> Element
            = "." "\"" name:$((!['"'][_])+) "\"" {
                Element::Field(name.to_owned())
            }
        rule field() -> Element
            = "." name:$((!['.' | '\n' | '[' | '"'][_])+) {
                Element::Field(name.to_owned())
            }
        rule each() -> Element
            = "[*]" { Element::Each }
        rule index() -> Element
            = "[" idx:$(['0'..='9']+) "]" {?
                idx.parse().map(Element::Index).or(Err("index"))
            }
        rule selector() -> Element
            = "[" key:$((!['='][_])+) "=\"" value:$((!['"'][_])+) "\"]" {
                Element::Select(key.to_owned(), Value::String(value.to_owned()))
            }
        rule element() -> Element
            = quoted_field()
            / field()
            / each()
            / index()
            / selector()

        pub rule path() -> PathBuf
            = path:element()+ { PathBuf(path) }
    }
}

pub fn parse(input: &str) -> Result<PathBuf, peg::error::ParseError<LineCol>> {
    parser::path(input)
}
