use std::fmt;

use serde::{Deserialize, Serialize};

/// Well-known datatype IRIs.
pub mod vocab {
    /// `xsd:string`
    pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
    /// `xsd:integer`
    pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
    /// `xsd:decimal`
    pub const XSD_DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
    /// `xsd:double`
    pub const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
    /// `xsd:boolean`
    pub const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
    /// `rdf:langString`
    pub const RDF_LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";
}

/// Literal value: lexical form, datatype IRI and optional language tag.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Literal {
    /// Lexical form as written.
    pub lexical: String,
    /// Datatype IRI.
    pub datatype: String,
    /// Language tag for `rdf:langString` literals.
    pub language: Option<String>,
}

/// An RDF term.
///
/// `Triple` is an RDF-star triple term: a whole subject/predicate/object
/// statement used as a single value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Term {
    /// Blank node with its label.
    BlankNode(String),
    /// IRI reference.
    Iri(String),
    /// Embedded triple term.
    Triple(Box<Triple>),
    /// Literal value.
    Literal(Literal),
}

impl Term {
    /// Creates an IRI term.
    pub fn iri(iri: impl Into<String>) -> Self {
        Term::Iri(iri.into())
    }

    /// Creates a blank node term.
    pub fn blank(label: impl Into<String>) -> Self {
        Term::BlankNode(label.into())
    }

    /// Creates an `xsd:string` literal.
    pub fn string(value: impl Into<String>) -> Self {
        Term::typed(value, vocab::XSD_STRING)
    }

    /// Creates an `xsd:integer` literal.
    pub fn integer(value: i64) -> Self {
        Term::typed(value.to_string(), vocab::XSD_INTEGER)
    }

    /// Creates an `xsd:boolean` literal.
    pub fn boolean(value: bool) -> Self {
        Term::typed(if value { "true" } else { "false" }, vocab::XSD_BOOLEAN)
    }

    /// Creates a literal with an explicit datatype.
    pub fn typed(lexical: impl Into<String>, datatype: impl Into<String>) -> Self {
        Term::Literal(Literal {
            lexical: lexical.into(),
            datatype: datatype.into(),
            language: None,
        })
    }

    /// Creates a language-tagged string.
    pub fn lang(lexical: impl Into<String>, language: impl Into<String>) -> Self {
        Term::Literal(Literal {
            lexical: lexical.into(),
            datatype: vocab::RDF_LANG_STRING.to_owned(),
            language: Some(language.into()),
        })
    }

    /// Creates a triple term.
    pub fn triple(subject: Term, predicate: Term, object: Term) -> Self {
        Term::Triple(Box::new(Triple::new(subject, predicate, object)))
    }

    /// Returns the embedded triple when this is a triple term.
    pub fn as_triple(&self) -> Option<&Triple> {
        match self {
            Term::Triple(triple) => Some(triple),
            _ => None,
        }
    }

    /// Returns the literal payload when this is a literal.
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Term::Literal(literal) => Some(literal),
            _ => None,
        }
    }

    /// Returns `true` for triple terms.
    pub fn is_triple(&self) -> bool {
        matches!(self, Term::Triple(_))
    }

    /// Interprets an `xsd:integer` literal.
    pub fn as_integer(&self) -> Option<i64> {
        let literal = self.as_literal()?;
        if literal.datatype != vocab::XSD_INTEGER {
            return None;
        }
        literal.lexical.trim().parse().ok()
    }

    /// Interprets any numeric literal as a double.
    pub fn as_f64(&self) -> Option<f64> {
        let literal = self.as_literal()?;
        match literal.datatype.as_str() {
            vocab::XSD_INTEGER | vocab::XSD_DECIMAL | vocab::XSD_DOUBLE => {
                literal.lexical.trim().parse().ok()
            }
            _ => None,
        }
    }

    /// Interprets an `xsd:boolean` literal.
    pub fn as_bool(&self) -> Option<bool> {
        let literal = self.as_literal()?;
        if literal.datatype != vocab::XSD_BOOLEAN {
            return None;
        }
        match literal.lexical.trim() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }

    /// Rough in-memory footprint, used by byte-based spill thresholds.
    pub fn estimated_bytes(&self) -> usize {
        match self {
            Term::BlankNode(label) | Term::Iri(label) => label.len() + 16,
            Term::Literal(literal) => {
                literal.lexical.len()
                    + literal.datatype.len()
                    + literal.language.as_ref().map_or(0, String::len)
                    + 24
            }
            Term::Triple(triple) => {
                triple.subject.estimated_bytes()
                    + triple.predicate.estimated_bytes()
                    + triple.object.estimated_bytes()
                    + 8
            }
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::BlankNode(label) => write!(f, "_:{label}"),
            Term::Iri(iri) => write!(f, "<{iri}>"),
            Term::Triple(triple) => write!(f, "{triple}"),
            Term::Literal(literal) => {
                if let Some(language) = &literal.language {
                    write!(f, "\"{}\"@{language}", literal.lexical)
                } else if literal.datatype == vocab::XSD_INTEGER {
                    write!(f, "{}", literal.lexical)
                } else if literal.datatype == vocab::XSD_STRING {
                    write!(f, "\"{}\"", literal.lexical)
                } else {
                    write!(f, "\"{}\"^^<{}>", literal.lexical, literal.datatype)
                }
            }
        }
    }
}

/// A concrete subject/predicate/object statement.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triple {
    /// Subject term.
    pub subject: Term,
    /// Predicate term.
    pub predicate: Term,
    /// Object term.
    pub object: Term,
}

impl Triple {
    /// Creates a triple.
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<< {} {} {} >>", self.subject, self.predicate, self.object)
    }
}
