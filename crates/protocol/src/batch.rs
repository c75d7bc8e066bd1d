use serde::Serialize;

/// Result of a batch operation that keeps going when single items fail.
#[derive(Debug, Serialize)]
#[serde(bound(serialize = "T: Serialize, E: std::fmt::Display"))]
pub struct BatchOutcome<T, E> {
    pub succeeded: Vec<T>,
    /// `(item id, error)` for every item that failed.
    #[serde(serialize_with = "serialize_failures")]
    pub failed: Vec<(String, E)>,
}

impl<T, E> BatchOutcome<T, E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn record(&mut self, id: impl Into<String>, result: Result<T, E>) {
        match result {
            Ok(value) => self.succeeded.push(value),
            Err(err) => self.failed.push((id.into(), err)),
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

impl<T, E> Default for BatchOutcome<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize `(id, error)` pairs as `{ "id": .., "error": .. }` objects.
pub fn serialize_failures<E, S>(failed: &[(String, E)], serializer: S) -> Result<S::Ok, S::Error>
where
    E: std::fmt::Display,
    S: serde::Serializer,
{
    use serde::ser::SerializeSeq;

    let mut seq = serializer.serialize_seq(Some(failed.len()))?;
    for (id, err) in failed {
        seq.serialize_element(&serde_json::json!({ "id": id, "error": err.to_string() }))?;
    }
    seq.end()
}
