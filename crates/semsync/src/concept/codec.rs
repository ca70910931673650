//! Turtle encoding of concept records.
//!
//! Encoding is deterministic: fixed prefix block, fixed field order, relations
//! in key order and targets in list order. Decoding is tolerant of anything it
//! does not understand: unknown predicates are ignored, malformed statements are
//! skipped up to the next `.`, and missing fields take their defaults.

use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use crate::provider::ProviderError;
use crate::provider::paths::{escape_name, unescape_name};

use super::model::Concept;

pub const RDFS_NS: &str = "http://www.w3.org/2000/01/rdf-schema#";
pub const REDSTRING_NS: &str = "https://redstring.io/vocab/";

const PREFIX: &str = "redstring:";
const CONCEPT_TYPE: &str = "redstring:Concept";
const LABEL: &str = "rdfs:label";
const COMMENT: &str = "rdfs:comment";
const COLOR: &str = "redstring:color";
const CREATED_AT: &str = "redstring:createdAt";
const DELETED: &str = "redstring:deleted";
const DELETED_AT: &str = "redstring:deletedAt";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Record contains no concept")]
    NoConcept,

    #[error("Unterminated {what} starting at byte {offset}")]
    Unterminated { what: &'static str, offset: usize },
}

impl From<CodecError> for ProviderError {
    fn from(err: CodecError) -> Self {
        ProviderError::parse(err.to_string())
    }
}

fn prefix_block() -> String {
    format!("@prefix rdfs: <{RDFS_NS}> .\n@prefix redstring: <{REDSTRING_NS}> .\n")
}

/// Serialize one concept as a standalone record.
#[must_use]
pub fn encode(concept: &Concept) -> String {
    let mut out = prefix_block();
    out.push('\n');
    write_block(&mut out, concept);
    out
}

/// Serialize many concepts into one document sharing a single prefix block.
#[must_use]
pub fn encode_graph(concepts: &[Concept]) -> String {
    let mut out = prefix_block();
    for concept in concepts {
        out.push('\n');
        write_block(&mut out, concept);
    }
    out
}

fn write_block(out: &mut String, concept: &Concept) {
    let mut lines = Vec::new();
    if let Some(name) = &concept.name {
        lines.push(format!("{LABEL} {}", quote(name)));
    }
    if let Some(description) = &concept.description {
        lines.push(format!("{COMMENT} {}", quote(description)));
    }
    if let Some(color) = &concept.color {
        lines.push(format!("{COLOR} {}", quote(color)));
    }
    lines.push(format!("{CREATED_AT} {}", quote(&timestamp(concept.created_at))));
    if concept.deleted {
        lines.push(format!("{DELETED} true"));
        if let Some(at) = concept.deleted_at {
            lines.push(format!("{DELETED_AT} {}", quote(&timestamp(at))));
        }
    }
    for (relation, targets) in &concept.relationships {
        for target in targets {
            lines.push(format!("{PREFIX}{} {}", escape_name(relation), reference(target)));
        }
    }

    let _ = write!(out, "{PREFIX}{} a {CONCEPT_TYPE}", escape_name(&concept.id));
    for line in lines {
        let _ = write!(out, " ;\n    {line}");
    }
    out.push_str(" .\n");
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Absolute IRIs are written as `<iri>`, anything else as a local name.
fn reference(target: &str) -> String {
    let iri_safe = target.contains("://")
        && !target
            .chars()
            .any(|c| c.is_whitespace() || "<>\"{}|\\^`".contains(c));
    if iri_safe {
        format!("<{target}>")
    } else {
        format!("{PREFIX}{}", escape_name(target))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    Iri(String),
    Literal(String),
    Bool(bool),
    TypeKeyword,
    Directive,
    Semicolon,
    Comma,
    Dot,
    Other,
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || ";,<>\"#()[]".contains(c)
}

fn tokenize(input: &str) -> Result<Vec<Token>, CodecError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' => {
                for (_, c) in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '<' => {
                chars.next();
                let mut iri = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '>' {
                        closed = true;
                        break;
                    }
                    iri.push(c);
                }
                if !closed {
                    return Err(CodecError::Unterminated { what: "IRI", offset });
                }
                tokens.push(Token::Iri(iri));
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next().map(|(_, c)| c) {
                            Some('n') => value.push('\n'),
                            Some('r') => value.push('\r'),
                            Some('t') => value.push('\t'),
                            Some(other) => value.push(other),
                            None => break,
                        },
                        c => value.push(c),
                    }
                }
                if !closed {
                    return Err(CodecError::Unterminated { what: "literal", offset });
                }
                // Language tags and datatypes carry nothing a concept needs.
                if chars.next_if(|&(_, c)| c == '@').is_some() {
                    while chars.next_if(|&(_, c)| c.is_alphanumeric() || c == '-').is_some() {}
                } else if chars.next_if(|&(_, c)| c == '^').is_some() {
                    chars.next_if(|&(_, c)| c == '^');
                    if chars.next_if(|&(_, c)| c == '<').is_some() {
                        for (_, c) in chars.by_ref() {
                            if c == '>' {
                                break;
                            }
                        }
                    } else {
                        while chars.next_if(|&(_, c)| !is_delimiter(c)).is_some() {}
                    }
                }
                tokens.push(Token::Literal(value));
            }
            ';' => {
                chars.next();
                tokens.push(Token::Semicolon);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '(' | ')' | '[' | ']' | '>' => {
                chars.next();
                tokens.push(Token::Other);
            }
            '@' => {
                chars.next();
                while chars.next_if(|&(_, c)| c.is_alphanumeric()).is_some() {}
                tokens.push(Token::Directive);
            }
            _ => {
                let mut word = String::new();
                while let Some((_, c)) = chars.next_if(|&(_, c)| !is_delimiter(c)) {
                    word.push(c);
                }
                let trimmed = word.trim_end_matches('.');
                let dots = word.len() - trimmed.len();
                match trimmed {
                    "" => {}
                    "a" => tokens.push(Token::TypeKeyword),
                    "true" => tokens.push(Token::Bool(true)),
                    "false" => tokens.push(Token::Bool(false)),
                    name => tokens.push(Token::Name(name.to_string())),
                }
                tokens.extend(std::iter::repeat_n(Token::Dot, dots));
            }
        }
    }
    Ok(tokens)
}

struct Triple {
    subject: Token,
    predicate: Token,
    object: Token,
}

/// Group tokens into triples, dropping any statement that does not parse.
fn triples(tokens: &[Token]) -> Vec<Triple> {
    let mut out = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        let statement_end = tokens[i..]
            .iter()
            .position(|t| *t == Token::Dot)
            .map_or(tokens.len(), |p| i + p);
        let statement = &tokens[i..statement_end];
        i = statement_end + 1;

        match statement.first() {
            None | Some(Token::Directive) => continue,
            Some(Token::Name(word))
                if word.eq_ignore_ascii_case("prefix") || word.eq_ignore_ascii_case("base") =>
            {
                continue;
            }
            _ => {}
        }

        if let Some(parsed) = parse_statement(statement) {
            out.extend(parsed);
        } else {
            tracing::debug!(tokens = statement.len(), "Skipping unparseable statement");
        }
    }
    out
}

fn parse_statement(statement: &[Token]) -> Option<Vec<Triple>> {
    let (subject, rest) = statement.split_first()?;
    if !matches!(subject, Token::Name(_) | Token::Iri(_)) {
        return None;
    }

    let mut out = Vec::new();
    for clause in rest.split(|t| *t == Token::Semicolon) {
        let Some((predicate, objects)) = clause.split_first() else {
            // `;` directly before `.` or doubled `;;`.
            continue;
        };
        if !matches!(predicate, Token::Name(_) | Token::Iri(_) | Token::TypeKeyword) {
            return None;
        }
        for object in objects.split(|t| *t == Token::Comma) {
            let [object] = object else {
                return None;
            };
            if !matches!(
                object,
                Token::Name(_) | Token::Iri(_) | Token::Literal(_) | Token::Bool(_)
            ) {
                return None;
            }
            out.push(Triple {
                subject: subject.clone(),
                predicate: predicate.clone(),
                object: object.clone(),
            });
        }
    }
    Some(out)
}

/// Concept id, relation or target named by a term.
fn term_id(term: &Token) -> Option<String> {
    match term {
        Token::Name(name) => Some(match name.strip_prefix(PREFIX) {
            Some(local) => unescape_name(local).unwrap_or_else(|| local.to_string()),
            None => name.clone(),
        }),
        Token::Iri(iri) => Some(iri.clone()),
        _ => None,
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

/// Parse a concept record.
///
/// The concept is the subject typed `redstring:Concept`, or failing that the first
/// subject in the document. A record flagged deleted decodes successfully with
/// `deleted` set; callers decide whether to show it.
pub fn decode(input: &str) -> Result<Concept, CodecError> {
    let tokens = tokenize(input)?;
    let triples = triples(&tokens);

    let subject = triples
        .iter()
        .find(|t| {
            t.predicate == Token::TypeKeyword && t.object == Token::Name(CONCEPT_TYPE.to_string())
        })
        .or_else(|| triples.first())
        .map(|t| t.subject.clone())
        .ok_or(CodecError::NoConcept)?;
    let id = term_id(&subject).ok_or(CodecError::NoConcept)?;

    let mut concept = Concept::new(id);
    let mut created_at = None;

    for triple in triples.iter().filter(|t| t.subject == subject) {
        let Token::Name(predicate) = &triple.predicate else {
            continue;
        };
        match (predicate.as_str(), &triple.object) {
            (LABEL, Token::Literal(v)) => concept.name = Some(v.clone()),
            (COMMENT, Token::Literal(v)) => concept.description = Some(v.clone()),
            (COLOR, Token::Literal(v)) => concept.color = Some(v.clone()),
            (CREATED_AT, Token::Literal(v)) => created_at = parse_timestamp(v),
            (DELETED, Token::Bool(flag)) => concept.deleted = *flag,
            (DELETED, Token::Literal(v)) => concept.deleted = v == "true",
            (DELETED_AT, Token::Literal(v)) => concept.deleted_at = parse_timestamp(v),
            (relation, target @ (Token::Name(_) | Token::Iri(_))) => {
                let Some(local) = relation.strip_prefix(PREFIX) else {
                    continue;
                };
                let relation = unescape_name(local).unwrap_or_else(|| local.to_string());
                if let Some(target) = term_id(target) {
                    concept.relationships.entry(relation).or_default().push(target);
                }
            }
            _ => {}
        }
    }

    if let Some(at) = created_at {
        concept.created_at = at;
    }
    Ok(concept)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn sample() -> Concept {
        Concept::new("climate-policy")
            .with_name("Climate \"Policy\"")
            .with_description("Line one\nLine two\twith tab")
            .with_color("#3a7")
            .with_relationship("influences", "economic-growth")
            .with_relationship("influences", "carbon tax")
            .with_relationship("seeAlso", "https://example.org/policy#x")
    }

    #[test]
    fn test_round_trip() {
        let concept = sample();
        assert_eq!(decode(&encode(&concept)).unwrap(), concept);
    }

    #[test]
    fn test_round_trip_tombstone() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let concept = sample().tombstone(at);
        let decoded = decode(&encode(&concept)).unwrap();
        assert!(decoded.deleted);
        assert_eq!(decoded.deleted_at, Some(at));
        assert_eq!(decoded, concept);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let created = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let mut concept = Concept::new("a")
            .with_name("A")
            .with_relationship("relatesTo", "b");
        concept.created_at = created;

        let expected = format!(
            "@prefix rdfs: <{RDFS_NS}> .\n@prefix redstring: <{REDSTRING_NS}> .\n\n\
             redstring:a a redstring:Concept ;\n    \
             rdfs:label \"A\" ;\n    \
             redstring:createdAt \"2025-01-02T03:04:05Z\" ;\n    \
             redstring:relatesTo redstring:b .\n"
        );
        assert_eq!(encode(&concept), expected);
        assert_eq!(encode(&concept), encode(&concept.clone()));
    }

    #[test]
    fn test_decode_hand_written_record() {
        let input = r#"
@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
@prefix redstring: <https://redstring.io/vocab/> .

redstring:ClimatePolicy a redstring:Concept ;
    rdfs:label "Climate Policy" ;
    rdfs:comment "Environmental policy framework" ;
    redstring:influences redstring:EconomicGrowth ;
    redstring:collaboratesWith redstring:CarbonTaxation .
"#;
        let concept = decode(input).unwrap();
        assert_eq!(concept.id, "ClimatePolicy");
        assert_eq!(concept.name.as_deref(), Some("Climate Policy"));
        assert_eq!(concept.description.as_deref(), Some("Environmental policy framework"));
        assert_eq!(concept.relationships["influences"], vec!["EconomicGrowth"]);
        assert_eq!(concept.relationships["collaboratesWith"], vec!["CarbonTaxation"]);
        assert!(!concept.deleted);
    }

    #[test]
    fn test_decode_tolerates_unknown_content() {
        let input = r#"
# exported by another tool
@prefix ex: <http://example.org/> .
ex:stray ex:junk [ ex:nested "x" ] .
redstring:n1 a redstring:Concept ;
    rdfs:label "Node"@en ;
    ex:unknown "ignored" ;
    redstring:weight "3"^^<http://www.w3.org/2001/XMLSchema#integer> ;
    redstring:createdAt "not a date" ;
    redstring:linksTo redstring:n2, redstring:n3 , ex:external .
"#;
        let before = Utc::now();
        let concept = decode(input).unwrap();
        assert_eq!(concept.id, "n1");
        assert_eq!(concept.name.as_deref(), Some("Node"));
        assert_eq!(concept.relationships.len(), 1);
        assert_eq!(concept.relationships["linksTo"], vec!["n2", "n3", "ex:external"]);
        // Unparseable timestamp falls back to now.
        assert!(concept.created_at >= before);
    }

    #[test]
    fn test_decode_untyped_record_uses_first_subject() {
        let concept = decode("redstring:x rdfs:label \"X\" .").unwrap();
        assert_eq!(concept.id, "x");
        assert_eq!(concept.name.as_deref(), Some("X"));
    }

    #[test]
    fn test_reserved_predicates_with_references_are_relations() {
        let concept = decode("redstring:x redstring:color redstring:red ; redstring:deleted redstring:y .")
            .unwrap();
        assert_eq!(concept.color, None);
        assert!(!concept.deleted);
        assert_eq!(concept.relationships["color"], vec!["red"]);
        assert_eq!(concept.relationships["deleted"], vec!["y"]);
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(decode("").unwrap_err(), CodecError::NoConcept);
        assert_eq!(decode("# only a comment\n").unwrap_err(), CodecError::NoConcept);
        assert!(matches!(
            decode("redstring:x rdfs:label \"open"),
            Err(CodecError::Unterminated { what: "literal", .. })
        ));
    }

    #[test]
    fn test_encode_graph_shares_prefixes() {
        let graph = encode_graph(&[Concept::new("a"), Concept::new("b")]);
        assert_eq!(graph.matches("@prefix redstring:").count(), 1);
        assert!(graph.contains("redstring:a a redstring:Concept"));
        assert!(graph.contains("redstring:b a redstring:Concept"));
    }
}
