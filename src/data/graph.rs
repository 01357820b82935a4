//! Graph node <-> triple conversion
//!
//! Nodes are expanded JSON-LD objects: every property value is an array of
//! `{"@id": ..}` references or `{"@value": .., "@type": ..}` literals.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::triple::{OBJECT_TYPE_IRI, TripleStore, TypedRdfTriple};
use crate::error::AppError;

/// `rdf:type`, the predicate `@type` is stored under
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";

/// Flatten one expanded node into triples
///
/// Blank nodes, lists and other values without a flat string form are
/// skipped.
///
/// # Errors
/// `Validation` if `node` is not an object with a string `@id`
pub fn triples_from_node(node: &Value) -> Result<Vec<TypedRdfTriple>, AppError> {
    let object = node
        .as_object()
        .ok_or_else(|| AppError::Validation("Graph node must be a JSON object".to_string()))?;
    let subject = object
        .get("@id")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Validation("Graph node has no @id".to_string()))?;

    let mut triples = Vec::new();
    for (predicate, values) in object {
        if predicate == "@id" {
            continue;
        }

        if predicate == "@type" {
            for type_iri in as_values(values).iter().filter_map(Value::as_str) {
                triples.push(TypedRdfTriple::reference(subject, RDF_TYPE, type_iri));
            }
            continue;
        }

        for value in as_values(values) {
            match object_of(value) {
                Some((object, object_type)) => {
                    let triple = TypedRdfTriple::new(subject, predicate.as_str(), object);
                    triples.push(match object_type {
                        Some(object_type) => triple.with_object_type(object_type),
                        None => triple,
                    });
                }
                None => {
                    tracing::debug!(
                        subject = %subject,
                        predicate = %predicate,
                        "Skipping value without a flat triple form"
                    );
                }
            }
        }
    }

    Ok(triples)
}

fn as_values(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => items,
        other => std::slice::from_ref(other),
    }
}

/// Object string and object type for one property value
fn object_of(value: &Value) -> Option<(String, Option<String>)> {
    match value {
        Value::Object(map) => {
            if let Some(iri) = map.get("@id").and_then(Value::as_str) {
                return Some((iri.to_string(), Some(OBJECT_TYPE_IRI.to_string())));
            }
            let literal = map.get("@value")?;
            let declared = map.get("@type").and_then(Value::as_str).map(str::to_string);
            let (object, native_type) = literal_of(literal)?;
            Some((object, declared.or(native_type)))
        }
        other => literal_of(other),
    }
}

fn literal_of(value: &Value) -> Option<(String, Option<String>)> {
    match value {
        Value::String(s) => Some((s.clone(), None)),
        Value::Bool(b) => Some((b.to_string(), Some(XSD_BOOLEAN.to_string()))),
        Value::Number(n) if n.is_i64() || n.is_u64() => {
            Some((n.to_string(), Some(XSD_INTEGER.to_string())))
        }
        Value::Number(n) => Some((n.to_string(), Some(XSD_DOUBLE.to_string()))),
        _ => None,
    }
}

/// Rebuild the expanded node for `iri` from its triples
///
/// Triples about other subjects are ignored. Literals come back as
/// `@value` strings; `objectType` becomes `@type`.
pub fn node_from_triples(iri: &str, triples: &[TypedRdfTriple]) -> Value {
    let mut sorted: Vec<&TypedRdfTriple> = triples
        .iter()
        .filter(|t| t.subject.as_deref() == Some(iri))
        .collect();
    sorted.sort();

    let mut node = Map::new();
    node.insert("@id".to_string(), Value::String(iri.to_string()));

    for triple in sorted {
        let (Some(predicate), Some(object)) = (&triple.predicate, &triple.object) else {
            continue;
        };

        if predicate == RDF_TYPE && triple.is_reference() {
            push(&mut node, "@type", Value::String(object.clone()));
            continue;
        }

        let value = match triple.object_type() {
            Some(OBJECT_TYPE_IRI) => json!({ "@id": object }),
            Some(datatype) => json!({ "@value": object, "@type": datatype }),
            None => json!({ "@value": object }),
        };
        push(&mut node, predicate, value);
    }

    Value::Object(node)
}

fn push(node: &mut Map<String, Value>, key: &str, value: Value) {
    if let Value::Array(items) = node
        .entry(key.to_string())
        .or_insert_with(|| Value::Array(Vec::new()))
    {
        items.push(value);
    }
}

/// Local persistence lookup used by the dereferencer for same-origin IRIs
#[async_trait]
pub trait LocalNodeSource: Send + Sync {
    /// Node stored for `iri`, or `None` when nothing is known about it
    async fn load(&self, iri: &str) -> Result<Option<Value>, AppError>;
}

/// [`LocalNodeSource`] reading nodes back out of a [`TripleStore`]
pub struct TripleStoreNodeSource<S> {
    store: Arc<S>,
}

impl<S: TripleStore> TripleStoreNodeSource<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Persist every triple of `node`
    pub async fn save(&self, node: &Value) -> Result<(), AppError> {
        let triples = triples_from_node(node)?;
        self.store.store_triples(&triples).await
    }
}

#[async_trait]
impl<S: TripleStore> LocalNodeSource for TripleStoreNodeSource<S> {
    async fn load(&self, iri: &str) -> Result<Option<Value>, AppError> {
        let triples = self
            .store
            .select(&TypedRdfTriple::pattern(Some(iri), None, None))
            .await?;

        if triples.is_empty() {
            return Ok(None);
        }
        Ok(Some(node_from_triples(iri, &triples)))
    }
}
