//! Observation capability set: traces, spans, and generations all expose the
//! same create-child operations, implemented by three distinct types with
//! static dispatch (no inheritance hierarchy; composition over the shared
//! `Ingestion` handle).

use crate::error::IngestError;
use crate::event::{EventBody, IngestionEvent};
use crate::id::IdGenerator;
use crate::ingestion::IngestionCore;
use serde_json::Value;
use std::sync::Arc;

/// Operations common to every observation kind: traces, spans, and
/// generations can all create children of each kind.
#[async_trait::async_trait]
pub trait ObservationCapability {
    fn id(&self) -> &str;
    fn trace_id(&self) -> &str;

    async fn new_span(&self, payload: Value) -> Result<Span, IngestError>;
    async fn new_generation(&self, payload: Value) -> Result<Generation, IngestError>;
    async fn new_event(&self, payload: Value) -> Result<(), IngestError>;
    async fn new_score(&self, payload: Value) -> Result<(), IngestError>;
}

struct Handle {
    core: Arc<IngestionCore>,
    ids: Arc<IdGenerator>,
}

impl Handle {
    async fn submit(&self, body: EventBody) -> Result<String, IngestError> {
        let id = self.ids.must_generate();
        let event = IngestionEvent::new(id.clone(), body);
        self.core.queue_event(event).await?;
        Ok(id)
    }
}

/// The root of an observation tree.
pub struct Trace {
    handle: Handle,
    id: String,
}

impl Trace {
    pub async fn create(
        core: Arc<IngestionCore>,
        ids: Arc<IdGenerator>,
        payload: Value,
    ) -> Result<Self, IngestError> {
        let handle = Handle { core, ids };
        let id = handle.ids.must_generate();
        handle.submit(EventBody::TraceCreate { id: id.clone(), payload }).await?;
        Ok(Self { handle, id })
    }
}

#[async_trait::async_trait]
impl ObservationCapability for Trace {
    fn id(&self) -> &str {
        &self.id
    }

    fn trace_id(&self) -> &str {
        &self.id
    }

    async fn new_span(&self, payload: Value) -> Result<Span, IngestError> {
        let span_id = self.handle.ids.must_generate();
        let event_id = self.handle.submit(EventBody::SpanCreate {
            id: span_id.clone(),
            trace_id: self.id.clone(),
            parent_observation_id: None,
            payload,
        }).await?;
        let _ = event_id;
        Ok(Span {
            handle: Handle { core: self.handle.core.clone(), ids: self.handle.ids.clone() },
            id: span_id,
            trace_id: self.id.clone(),
        })
    }

    async fn new_generation(&self, payload: Value) -> Result<Generation, IngestError> {
        let gen_id = self.handle.ids.must_generate();
        self.handle.submit(EventBody::GenerationCreate {
            id: gen_id.clone(),
            trace_id: self.id.clone(),
            parent_observation_id: None,
            payload,
        }).await?;
        Ok(Generation {
            handle: Handle { core: self.handle.core.clone(), ids: self.handle.ids.clone() },
            id: gen_id,
            trace_id: self.id.clone(),
        })
    }

    async fn new_event(&self, payload: Value) -> Result<(), IngestError> {
        self.handle
            .submit(EventBody::EventCreate {
                id: self.handle.ids.must_generate(),
                trace_id: self.id.clone(),
                parent_observation_id: None,
                payload,
            })
            .await
            .map(|_| ())
    }

    async fn new_score(&self, payload: Value) -> Result<(), IngestError> {
        self.handle
            .submit(EventBody::ScoreCreate {
                id: self.handle.ids.must_generate(),
                trace_id: self.id.clone(),
                observation_id: None,
                payload,
            })
            .await
            .map(|_| ())
    }
}

/// A named unit of work within a trace.
pub struct Span {
    handle: Handle,
    id: String,
    trace_id: String,
}

#[async_trait::async_trait]
impl ObservationCapability for Span {
    fn id(&self) -> &str {
        &self.id
    }

    fn trace_id(&self) -> &str {
        &self.trace_id
    }

    async fn new_span(&self, payload: Value) -> Result<Span, IngestError> {
        let span_id = self.handle.ids.must_generate();
        self.handle.submit(EventBody::SpanCreate {
            id: span_id.clone(),
            trace_id: self.trace_id.clone(),
            parent_observation_id: Some(self.id.clone()),
            payload,
        }).await?;
        Ok(Span {
            handle: Handle { core: self.handle.core.clone(), ids: self.handle.ids.clone() },
            id: span_id,
            trace_id: self.trace_id.clone(),
        })
    }

    async fn new_generation(&self, payload: Value) -> Result<Generation, IngestError> {
        let gen_id = self.handle.ids.must_generate();
        self.handle.submit(EventBody::GenerationCreate {
            id: gen_id.clone(),
            trace_id: self.trace_id.clone(),
            parent_observation_id: Some(self.id.clone()),
            payload,
        }).await?;
        Ok(Generation {
            handle: Handle { core: self.handle.core.clone(), ids: self.handle.ids.clone() },
            id: gen_id,
            trace_id: self.trace_id.clone(),
        })
    }

    async fn new_event(&self, payload: Value) -> Result<(), IngestError> {
        self.handle
            .submit(EventBody::EventCreate {
                id: self.handle.ids.must_generate(),
                trace_id: self.trace_id.clone(),
                parent_observation_id: Some(self.id.clone()),
                payload,
            })
            .await
            .map(|_| ())
    }

    async fn new_score(&self, payload: Value) -> Result<(), IngestError> {
        self.handle
            .submit(EventBody::ScoreCreate {
                id: self.handle.ids.must_generate(),
                trace_id: self.trace_id.clone(),
                observation_id: Some(self.id.clone()),
                payload,
            })
            .await
            .map(|_| ())
    }
}

/// An observation specialized for an LLM call.
pub struct Generation {
    handle: Handle,
    id: String,
    trace_id: String,
}

#[async_trait::async_trait]
impl ObservationCapability for Generation {
    fn id(&self) -> &str {
        &self.id
    }

    fn trace_id(&self) -> &str {
        &self.trace_id
    }

    async fn new_span(&self, payload: Value) -> Result<Span, IngestError> {
        let span_id = self.handle.ids.must_generate();
        self.handle.submit(EventBody::SpanCreate {
            id: span_id.clone(),
            trace_id: self.trace_id.clone(),
            parent_observation_id: Some(self.id.clone()),
            payload,
        }).await?;
        Ok(Span {
            handle: Handle { core: self.handle.core.clone(), ids: self.handle.ids.clone() },
            id: span_id,
            trace_id: self.trace_id.clone(),
        })
    }

    async fn new_generation(&self, payload: Value) -> Result<Generation, IngestError> {
        let gen_id = self.handle.ids.must_generate();
        self.handle.submit(EventBody::GenerationCreate {
            id: gen_id.clone(),
            trace_id: self.trace_id.clone(),
            parent_observation_id: Some(self.id.clone()),
            payload,
        }).await?;
        Ok(Generation {
            handle: Handle { core: self.handle.core.clone(), ids: self.handle.ids.clone() },
            id: gen_id,
            trace_id: self.trace_id.clone(),
        })
    }

    async fn new_event(&self, payload: Value) -> Result<(), IngestError> {
        self.handle
            .submit(EventBody::EventCreate {
                id: self.handle.ids.must_generate(),
                trace_id: self.trace_id.clone(),
                parent_observation_id: Some(self.id.clone()),
                payload,
            })
            .await
            .map(|_| ())
    }

    async fn new_score(&self, payload: Value) -> Result<(), IngestError> {
        self.handle
            .submit(EventBody::ScoreCreate {
                id: self.handle.ids.must_generate(),
                trace_id: self.trace_id.clone(),
                observation_id: Some(self.id.clone()),
                payload,
            })
            .await
            .map(|_| ())
    }
}
