//! RDF triples and the triple store contract
//!
//! Every ActivityPub object is persisted as a set of [`TypedRdfTriple`]s.
//! A [`TripleStore`] gives set semantics: storing a present triple and
//! deleting an absent one are both no-ops.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::AppError;
use crate::metrics::TRIPLE_OPERATIONS_TOTAL;

/// `objectType` marking an object that is itself an IRI reference
pub const OBJECT_TYPE_IRI: &str = "@id";

/// XML Schema dateTime datatype IRI
pub const XSD_DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";

/// Subject/predicate/object statement with an optional object type
///
/// Used both as a stored triple (all of subject, predicate, object set) and
/// as a selection pattern where `None` matches anything.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedRdfTriple {
    pub subject: Option<String>,
    pub predicate: Option<String>,
    pub object: Option<String>,
    pub object_type: Option<String>,
}

impl TypedRdfTriple {
    /// Fully specified triple with a plain literal object
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: Some(subject.into()),
            predicate: Some(predicate.into()),
            object: Some(object.into()),
            object_type: None,
        }
    }

    /// Fully specified triple whose object is an IRI reference
    pub fn reference(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self::new(subject, predicate, object).with_object_type(OBJECT_TYPE_IRI)
    }

    /// Selection pattern; `None` fields are wildcards
    pub fn pattern(
        subject: Option<&str>,
        predicate: Option<&str>,
        object: Option<&str>,
    ) -> Self {
        Self {
            subject: subject.map(str::to_string),
            predicate: predicate.map(str::to_string),
            object: object.map(str::to_string),
            object_type: None,
        }
    }

    /// Pattern matching every triple
    pub fn any() -> Self {
        Self::default()
    }

    /// Set the object type; an empty string leaves the object untyped
    pub fn with_object_type(mut self, object_type: impl Into<String>) -> Self {
        let object_type = object_type.into();
        self.object_type = (!object_type.is_empty()).then_some(object_type);
        self
    }

    /// Object type, with `Some("")` read as untyped
    pub fn object_type(&self) -> Option<&str> {
        self.object_type.as_deref().filter(|t| !t.is_empty())
    }

    /// Copy with an empty object type cleared
    pub fn normalized(&self) -> Self {
        Self {
            object_type: self.object_type().map(str::to_string),
            ..self.clone()
        }
    }

    /// Subject, predicate and object are all present
    pub fn is_fully_specified(&self) -> bool {
        self.subject.is_some() && self.predicate.is_some() && self.object.is_some()
    }

    /// Object is an IRI reference rather than a literal
    pub fn is_reference(&self) -> bool {
        self.object_type() == Some(OBJECT_TYPE_IRI)
    }

    /// Whether `candidate` matches this pattern
    pub fn matches(&self, candidate: &TypedRdfTriple) -> bool {
        fn field(pattern: Option<&str>, value: Option<&str>) -> bool {
            pattern.is_none() || pattern == value
        }

        field(self.subject.as_deref(), candidate.subject.as_deref())
            && field(self.predicate.as_deref(), candidate.predicate.as_deref())
            && field(self.object.as_deref(), candidate.object.as_deref())
            && field(self.object_type(), candidate.object_type())
    }

    /// Subject, predicate and object of a fully specified triple
    pub fn parts(&self) -> Result<(&str, &str, &str), AppError> {
        match (&self.subject, &self.predicate, &self.object) {
            (Some(subject), Some(predicate), Some(object)) => Ok((subject, predicate, object)),
            _ => Err(AppError::InvalidTriple(format!(
                "subject, predicate and object are required: {:?}",
                self
            ))),
        }
    }

    /// Reject triples that may not be stored or deleted
    pub fn ensure_fully_specified(&self) -> Result<(), AppError> {
        self.parts().map(|_| ())
    }
}

/// Persistence contract for the RDF graph
///
/// No ordering, transactionality or pagination is promised for `select`.
/// Backends must be safe for concurrent use.
#[async_trait]
pub trait TripleStore: Send + Sync {
    /// Insert one triple; no-op when already present
    ///
    /// # Errors
    /// `InvalidTriple` when the triple is not fully specified
    async fn store_triple(&self, triple: &TypedRdfTriple) -> Result<(), AppError>;

    /// Remove one triple; no-op when absent
    ///
    /// # Errors
    /// `InvalidTriple` when the triple is not fully specified
    async fn delete_triple(&self, triple: &TypedRdfTriple) -> Result<(), AppError>;

    /// Every stored triple matching `pattern`
    async fn select(&self, pattern: &TypedRdfTriple) -> Result<Vec<TypedRdfTriple>, AppError>;

    /// Insert many triples
    ///
    /// Validates all triples before storing any.
    async fn store_triples(&self, triples: &[TypedRdfTriple]) -> Result<(), AppError> {
        for triple in triples {
            triple.ensure_fully_specified()?;
        }
        for triple in triples {
            self.store_triple(triple).await?;
        }
        Ok(())
    }

    /// Remove many triples
    ///
    /// Validates all triples before deleting any.
    async fn delete_triples(&self, triples: &[TypedRdfTriple]) -> Result<(), AppError> {
        for triple in triples {
            triple.ensure_fully_specified()?;
        }
        for triple in triples {
            self.delete_triple(triple).await?;
        }
        Ok(())
    }
}

/// In-memory triple store
///
/// Reference implementation of [`TripleStore`]; contents are lost on drop.
#[derive(Default)]
pub struct MemoryTripleStore {
    triples: RwLock<BTreeSet<TypedRdfTriple>>,
}

impl MemoryTripleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored triples
    pub async fn len(&self) -> usize {
        self.triples.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.triples.read().await.is_empty()
    }
}

#[async_trait]
impl TripleStore for MemoryTripleStore {
    async fn store_triple(&self, triple: &TypedRdfTriple) -> Result<(), AppError> {
        triple.ensure_fully_specified()?;
        self.triples.write().await.insert(triple.normalized());
        TRIPLE_OPERATIONS_TOTAL
            .with_label_values(&["store", "memory"])
            .inc();
        Ok(())
    }

    async fn delete_triple(&self, triple: &TypedRdfTriple) -> Result<(), AppError> {
        triple.ensure_fully_specified()?;
        self.triples.write().await.remove(&triple.normalized());
        TRIPLE_OPERATIONS_TOTAL
            .with_label_values(&["delete", "memory"])
            .inc();
        Ok(())
    }

    async fn select(&self, pattern: &TypedRdfTriple) -> Result<Vec<TypedRdfTriple>, AppError> {
        TRIPLE_OPERATIONS_TOTAL
            .with_label_values(&["select", "memory"])
            .inc();
        Ok(self
            .triples
            .read()
            .await
            .iter()
            .filter(|candidate| pattern.matches(candidate))
            .cloned()
            .collect())
    }
}
