//! Source Interface Scanner
//!
//! Lexical extraction of exported field-list declarations from typed source
//! files: `export interface Name { ... }` and `export type Name = { ... }`.
//! Block bodies are delimited by brace depth, so nested object types stay
//! inside their field instead of truncating the declaration. Anything that
//! does not look like `name[?]: type` is skipped without error.
//!
//! Declarations inside comments or string literals are ignored. An alias
//! counts only when its object type is the whole right-hand side.

use crate::model::{Field, InterfaceDef};
use once_cell::sync::Lazy;
use regex::Regex;

/// Extensions treated as typed source
pub const TYPED_SOURCE_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".mts", ".cts"];

static DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bexport\s+(?:declare\s+)?(interface|type)\s+([A-Za-z_$][\w$]*)")
        .expect("declaration pattern is valid")
});

static FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:readonly\s+)?([A-Za-z_$][\w$]*)(\?)?\s*:\s*(.+?)\s*,?$")
        .expect("field pattern is valid")
});

static NULLISH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:null|undefined)\b").expect("nullish pattern is valid"));

/// Whether a path names a file the scanner reads
pub fn is_typed_source(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    TYPED_SOURCE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Extract every declaration in `text`, in order of appearance
pub fn scan_source(path: &str, text: &str) -> Vec<InterfaceDef> {
    let bytes = text.as_bytes();
    let masked = non_code_ranges(bytes);
    let mut found = Vec::new();
    let mut resume_at = 0;

    for caps in DECLARATION.captures_iter(text) {
        let (Some(whole), Some(kind), Some(name)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        if whole.start() < resume_at || is_masked(&masked, whole.start()) {
            continue;
        }

        let is_alias = kind.as_str() == "type";
        let body_start = if is_alias {
            alias_body_start(bytes, whole.end())
        } else {
            interface_body_start(bytes, whole.end())
        };
        let Some(body_start) = body_start else { continue };
        let Some(body_end) = find_block_end(text, body_start) else {
            // unterminated block: nothing reliable to extract
            continue;
        };
        // `{ ... }[]` and `{ ... } & Base` are not plain field lists
        if is_alias && !closes_alias(bytes, body_end + 1) {
            continue;
        }
        resume_at = body_end;

        let line = text[..whole.start()].matches('\n').count() + 1;
        found.push(InterfaceDef {
            name: name.as_str().to_string(),
            source: format!("{}:{}", path, line),
            fields: parse_fields(&text[body_start..body_end]),
            mapped_to: None,
        });
    }

    found
}

/// Parse the members of a block body into fields
pub fn parse_fields(body: &str) -> Vec<Field> {
    split_members(body)
        .iter()
        .filter_map(|member| {
            let caps = FIELD.captures(member)?;
            let name = caps.get(1)?.as_str().to_string();
            let optional = caps.get(2).is_some();
            let type_text = caps.get(3)?.as_str().to_string();
            let nullable = optional || NULLISH.is_match(&type_text);
            Some(Field {
                name,
                type_text,
                nullable,
            })
        })
        .collect()
}

/// Start of the body after `interface Name`, past any type parameters and
/// heritage clauses
fn interface_body_start(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'<' => i = skip_generics(bytes, i)?,
            b'{' => return Some(i + 1),
            b';' | b'=' | b'}' => return None,
            b'"' | b'\'' | b'`' => i = skip_string(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'/') => i = skip_line_comment(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i),
            _ => i += 1,
        }
    }
    None
}

/// Start of the body after `type Name`, which must be `[<...>] = {`
fn alias_body_start(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = skip_whitespace(bytes, start);
    if bytes.get(i) == Some(&b'<') {
        i = skip_whitespace(bytes, skip_generics(bytes, i)?);
    }
    if bytes.get(i) != Some(&b'=') {
        return None;
    }
    i = skip_whitespace(bytes, i + 1);
    (bytes.get(i) == Some(&b'{')).then_some(i + 1)
}

/// Whether the text after an alias body ends the declaration
fn closes_alias(bytes: &[u8], start: usize) -> bool {
    let mut crossed_line = false;
    let mut i = start;
    while let Some(&b) = bytes.get(i) {
        match b {
            b'\n' => crossed_line = true,
            b' ' | b'\t' | b'\r' => {}
            b';' => return true,
            b'[' | b'&' | b'|' | b'.' => return false,
            b'/' if matches!(bytes.get(i + 1), Some(b'/') | Some(b'*')) => return true,
            _ => return crossed_line,
        }
        i += 1;
    }
    true
}

/// Index just past the `>` matching the `<` at `start`
fn skip_generics(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'<' => depth += 1,
            // arrow in a function type
            b'>' if i > 0 && bytes[i - 1] == b'=' => {}
            b'>' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            b'"' | b'\'' | b'`' => {
                i = skip_string(bytes, i);
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn skip_whitespace(bytes: &[u8], start: usize) -> usize {
    bytes[start.min(bytes.len())..]
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map_or(bytes.len(), |offset| start + offset)
}

/// Sorted `[start, end)` spans of string literals and comments
fn non_code_ranges(bytes: &[u8]) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let end = match bytes[i] {
            b'"' | b'\'' | b'`' => skip_string(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'/') => skip_line_comment(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => skip_block_comment(bytes, i),
            _ => {
                i += 1;
                continue;
            }
        };
        ranges.push((i, end));
        i = end.max(i + 1);
    }
    ranges
}

fn is_masked(ranges: &[(usize, usize)], pos: usize) -> bool {
    let idx = ranges.partition_point(|(start, _)| *start <= pos);
    idx > 0 && pos < ranges[idx - 1].1
}

/// Index of the `}` closing a block whose body starts at `start`
fn find_block_end(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 1usize;
    let mut i = start;

    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' | b'`' => i = skip_string(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'/') => i = skip_line_comment(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i),
            b'{' => {
                depth += 1;
                i += 1;
            }
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    None
}

/// Split a body on `;` and line breaks at nesting depth zero, dropping comments
/// and collapsing whitespace inside each member.
fn split_members(body: &str) -> Vec<String> {
    let bytes = body.as_bytes();
    let mut members = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut segment_start = 0;
    let mut i = 0;

    fn flush(current: &mut String, members: &mut Vec<String>) {
        let member = current.split_whitespace().collect::<Vec<_>>().join(" ");
        if !member.is_empty() {
            members.push(member);
        }
        current.clear();
    }

    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' | b'`' => i = skip_string(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'/') || bytes.get(i + 1) == Some(&b'*') => {
                current.push_str(&body[segment_start..i]);
                i = if bytes[i + 1] == b'/' {
                    skip_line_comment(bytes, i)
                } else {
                    skip_block_comment(bytes, i)
                };
                segment_start = i;
            }
            b'{' | b'(' | b'[' => {
                depth += 1;
                i += 1;
            }
            b'}' | b')' | b']' => {
                depth = depth.saturating_sub(1);
                i += 1;
            }
            b';' | b'\n' if depth == 0 => {
                current.push_str(&body[segment_start..i]);
                flush(&mut current, &mut members);
                i += 1;
                segment_start = i;
            }
            _ => i += 1,
        }
    }
    current.push_str(&body[segment_start.min(body.len())..]);
    flush(&mut current, &mut members);

    members
}

/// Index just past the closing quote (or end of input). Single and double
/// quoted strings also stop at a line break.
fn skip_string(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return i + 1,
            b'\n' if quote != b'`' => return i,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Index of the terminating newline (left for the caller)
fn skip_line_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|b| *b == b'\n')
        .map_or(bytes.len(), |offset| start + offset)
}

/// Index just past `*/` (or end of input)
fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 2;
    while i + 1 < bytes.len() {
        if bytes[i] == b'*' && bytes[i + 1] == b'/' {
            return i + 2;
        }
        i += 1;
    }
    bytes.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn field(name: &str, type_text: &str, nullable: bool) -> Field {
        Field {
            name: name.to_string(),
            type_text: type_text.to_string(),
            nullable,
        }
    }

    #[test]
    fn test_typed_source_extensions() {
        assert!(is_typed_source("src/models/user.ts"));
        assert!(is_typed_source("web/App.TSX"));
        assert!(is_typed_source("types/index.d.ts"));
        assert!(!is_typed_source("src/main.js"));
        assert!(!is_typed_source("README.md"));
    }

    #[test]
    fn test_interface_and_type_alias() {
        let text = "\
import { Foo } from './foo';

export interface User {
  id: string;
  email?: string;
  deletedAt: Date | null;
  nickname: string | undefined
  readonly createdAt: Date;
}

export type Order = {
  id: number;
  total: number;
};
";
        let found = scan_source("src/models.ts", text);

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "User");
        assert_eq!(found[0].source, "src/models.ts:3");
        assert_eq!(
            found[0].fields,
            vec![
                field("id", "string", false),
                field("email", "string", true),
                field("deletedAt", "Date | null", true),
                field("nickname", "string | undefined", true),
                field("createdAt", "Date", false),
            ]
        );
        assert_eq!(found[1].name, "Order");
        assert_eq!(found[1].source, "src/models.ts:11");
        assert_eq!(found[1].fields.len(), 2);
    }

    #[test]
    fn test_non_field_members_skipped() {
        let text = "export interface Repo {
  [key: string]: unknown;
  find(id: string): Promise<User>;
  // name: string
  /** the owner */
  owner: string;
  count: number, // trailing
}";
        let found = scan_source("repo.ts", text);
        assert_eq!(
            found[0].fields,
            vec![field("owner", "string", false), field("count", "number", false)]
        );
    }

    #[test]
    fn test_nested_object_stays_one_field() {
        let text = "export interface Customer {
  id: string;
  address: {
    street: string;
    city: string;
  };
  notes: string | null;
}";
        let found = scan_source("customer.ts", text);

        let names: Vec<&str> = found[0].fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "address", "notes"]);
        assert_eq!(found[0].fields[1].type_text, "{ street: string; city: string; }");
        assert!(found[0].fields[2].nullable);
    }

    #[test]
    fn test_nullish_must_be_whole_word() {
        let fields = parse_fields("kind: NullableKind;\nvalue: undefinedBehaviour");
        assert_eq!(
            fields,
            vec![
                field("kind", "NullableKind", false),
                field("value", "undefinedBehaviour", false),
            ]
        );
    }

    #[test]
    fn test_non_exported_and_union_aliases_ignored() {
        let text = "interface Internal { a: string }
export type Status = 'open' | 'closed';
export interface Generic<T> extends Base { value: T }";
        let found = scan_source("x.ts", text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Generic");
        assert_eq!(found[0].source, "x.ts:3");
        assert_eq!(found[0].fields, vec![field("value", "T", false)]);
    }

    #[test]
    fn test_braces_in_strings_do_not_close_block() {
        let text = "export type Token = {\n  open: '{';\n  close: \"}\";\n}";
        let found = scan_source("t.ts", text);
        assert_eq!(found[0].fields.len(), 2);
        assert_eq!(found[0].fields[1].type_text, "\"}\"");
    }

    #[test]
    fn test_unterminated_block_is_skipped() {
        let found = scan_source("broken.ts", "export interface Broken {\n  id: string;\n");
        assert!(found.is_empty());
    }

    #[test]
    fn test_alias_must_end_after_body() {
        let text = "export type Users = { id: string }[];
export type Props = { a: string } & Base;
export type Either = { a: string } | { b: string };
export type Row = { id: number } // trailing note
export type Pair = {
  left: string;
  right: string;
}
";
        let found = scan_source("aliases.ts", text);
        let names: Vec<&str> = found.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Row", "Pair"]);
        assert_eq!(found[0].fields, vec![field("id", "number", false)]);
        assert_eq!(found[1].source, "aliases.ts:5");
    }

    #[test]
    fn test_commented_declarations_ignored() {
        let text = "// export interface Old { id: string }
/* export interface Gone {
  id: string;
} */
const hint = \"export interface Quoted { id: string }\";
export interface Live { id: string }";
        let found = scan_source("c.ts", text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Live");
        assert_eq!(found[0].source, "c.ts:6");
    }

    #[test]
    fn test_braces_in_type_parameters_skipped() {
        let text = "export interface Box<T extends { k: number }> { id: string; value: T }
export type Keyed<K extends { id: string } = { id: string }> = { key: K };
export interface Handler<F extends (x: number) => void> extends Base<{ a: 1 }> { run: F }";
        let found = scan_source("g.ts", text);

        assert_eq!(found.len(), 3);
        assert_eq!(
            found[0].fields,
            vec![field("id", "string", false), field("value", "T", false)]
        );
        assert_eq!(found[1].name, "Keyed");
        assert_eq!(found[1].fields, vec![field("key", "K", false)]);
        assert_eq!(found[2].fields, vec![field("run", "F", false)]);
    }
}
