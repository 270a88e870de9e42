// Copyright (C) 2020-2026  The Blockhouse Technology Limited (TBTL).
//
// This program is free software: you can redistribute it and/or modify it
// under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or (at your
// option) any later version.
//
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public
// License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::fmt::Write as _;

use crate::{decode_multiple, Asn1Object, IntegerTag, TagClass, TimeTag, MAX_NESTING_DEPTH};

const INDENT: &str = "  ";
const DUMP_WIDTH: usize = 16;

/// Renders `object` as an indented, human readable tree.
///
/// Contents of tagged values and octet strings are speculatively decoded as nested DER; when that
/// fails they are shown as a hex and ASCII dump.  Rendering never fails.
pub fn pretty_print(object: &Asn1Object) -> String {
    let mut out = String::new();
    render(object, 0, &mut out);
    out
}

fn render(object: &Asn1Object, depth: usize, out: &mut String) {
    let indent = INDENT.repeat(depth);
    if depth > MAX_NESTING_DEPTH {
        let _ = writeln!(out, "{indent}...");
        return;
    }
    // Writing into a `String` cannot fail, hence the ignored results.
    match object {
        Asn1Object::Boolean(value) => {
            let _ = writeln!(out, "{indent}BOOLEAN {value}");
        }
        Asn1Object::Integer { tag, value } => {
            let name = match tag {
                IntegerTag::Integer => "INTEGER",
                IntegerTag::Enumerated => "ENUMERATED",
            };
            match object.as_i64() {
                Ok(Some(number)) => {
                    let _ = writeln!(out, "{indent}{name} {number}");
                }
                _ => {
                    let _ = writeln!(out, "{indent}{name} 0x{}", hex::encode(value));
                }
            }
        }
        Asn1Object::Null => {
            let _ = writeln!(out, "{indent}NULL");
        }
        Asn1Object::ObjectIdentifier(oid) => match oid.name() {
            Some(name) => {
                let _ = writeln!(out, "{indent}OBJECT IDENTIFIER {oid} ({name})");
            }
            None => {
                let _ = writeln!(out, "{indent}OBJECT IDENTIFIER {oid}");
            }
        },
        Asn1Object::OctetString(value) => {
            let _ = writeln!(out, "{indent}OCTET STRING ({} bytes)", value.len());
            render_nested(value, depth + 1, out);
        }
        Asn1Object::BitString { unused_bits, value } => {
            let _ = writeln!(
                out,
                "{indent}BIT STRING ({} bytes, {unused_bits} unused bits)",
                value.len()
            );
            if *unused_bits == 0 {
                render_nested(value, depth + 1, out);
            } else {
                hex_dump(value, depth + 1, out);
            }
        }
        Asn1Object::Sequence(elements) => {
            let _ = writeln!(out, "{indent}SEQUENCE");
            elements
                .iter()
                .for_each(|element| render(element, depth + 1, out));
        }
        Asn1Object::Set(elements) => {
            let _ = writeln!(out, "{indent}SET");
            elements
                .iter()
                .for_each(|element| render(element, depth + 1, out));
        }
        Asn1Object::String { tag, value } => {
            let _ = writeln!(out, "{indent}{tag:?}String {value:?}");
        }
        Asn1Object::Time { tag, value } => {
            let name = match tag {
                TimeTag::UtcTime => "UTCTime",
                TimeTag::GeneralizedTime => "GeneralizedTime",
            };
            let _ = writeln!(out, "{indent}{name} {}", value.to_rfc3339());
        }
        Asn1Object::Tagged {
            class,
            tag,
            contents,
            ..
        } => {
            let prefix = match class {
                TagClass::Application => "APPLICATION ",
                TagClass::Private => "PRIVATE ",
                TagClass::ContextSpecific | TagClass::Universal => "",
            };
            let _ = writeln!(out, "{indent}[{prefix}{tag}]");
            render_nested(contents, depth + 1, out);
        }
        Asn1Object::Raw {
            identifier,
            contents,
        } => {
            let _ = writeln!(
                out,
                "{indent}UNIVERSAL {} ({} bytes)",
                identifier.tag,
                contents.len()
            );
            hex_dump(contents, depth + 1, out);
        }
    }
}

fn render_nested(contents: &[u8], depth: usize, out: &mut String) {
    if depth > MAX_NESTING_DEPTH {
        hex_dump(contents, depth, out);
        return;
    }
    match decode_multiple(contents) {
        Ok(objects) if !objects.is_empty() => {
            objects
                .iter()
                .for_each(|object| render(object, depth, out));
        }
        _ => hex_dump(contents, depth, out),
    }
}

fn hex_dump(bytes: &[u8], depth: usize, out: &mut String) {
    let indent = INDENT.repeat(depth);
    for (line, chunk) in bytes.chunks(DUMP_WIDTH).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
        let ascii: String = chunk
            .iter()
            .map(|b| {
                if b.is_ascii_graphic() || *b == b' ' {
                    char::from(*b)
                } else {
                    '.'
                }
            })
            .collect();
        let _ = writeln!(
            out,
            "{indent}{:04x}: {:<width$} |{ascii}|",
            line * DUMP_WIDTH,
            hex.join(" "),
            width = DUMP_WIDTH * 3 - 1
        );
    }
}
