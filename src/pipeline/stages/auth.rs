//! Authentication stage.
//!
//! Attaches the current credential to every attempt and turns a 401 into
//! `Unauthorized` however the inner chain reported it. Credential refresh is
//! the provider's business; this stage only asks for the current value.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::error::NetworkError;
use crate::pipeline::stage::{Next, Outcome, PipelineRequest, Stage, StageError};
use crate::transport::TransportError;

pub const AUTHORIZATION: &str = "authorization";

/// Source of the bearer credential.
pub trait CredentialProvider: Send + Sync {
    /// The credential to attach, if any.
    fn credential(&self) -> Option<String>;
}

impl<F> CredentialProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn credential(&self) -> Option<String> {
        self()
    }
}

/// Provider for unauthenticated hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

impl CredentialProvider for NoCredentials {
    fn credential(&self) -> Option<String> {
        None
    }
}

pub struct AuthStage {
    credentials: Arc<dyn CredentialProvider>,
}

impl AuthStage {
    pub fn new(credentials: Arc<dyn CredentialProvider>) -> Self {
        Self { credentials }
    }
}

impl Stage for AuthStage {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn process<'a>(&'a self, mut request: PipelineRequest, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            // A caller-supplied header wins.
            if request.descriptor.header(AUTHORIZATION).is_none() {
                if let Some(token) = self.credentials.credential() {
                    request
                        .descriptor
                        .headers
                        .insert(AUTHORIZATION.to_string(), format!("Bearer {token}"));
                }
            }

            let id = request.id();
            let outcome = next.run(request).await;
            if is_unauthorized(&outcome) {
                tracing::warn!(request_id = %id, "Credential rejected");
                return Err(StageError::Network(NetworkError::Unauthorized));
            }
            outcome
        })
    }
}

fn is_unauthorized(outcome: &Outcome) -> bool {
    matches!(
        outcome,
        Ok(response) if response.status == 401
    ) || matches!(
        outcome,
        Err(StageError::Transport(TransportError::Status { status: 401, .. }))
            | Err(StageError::Network(NetworkError::Unauthorized))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stages::{ErrorMappingStage, RetryStage};
    use crate::pipeline::RequestPipeline;
    use crate::resilience::RetryPolicy;
    use crate::transport::{RequestDescriptor, ResponseDescriptor, Transport};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records the authorization header of every attempt and answers with a fixed status.
    struct Recording {
        status: u16,
        seen: Mutex<Vec<Option<String>>>,
    }

    impl Transport for Recording {
        fn execute<'a>(
            &'a self,
            request: &'a RequestDescriptor,
        ) -> BoxFuture<'a, Result<ResponseDescriptor, TransportError>> {
            self.seen
                .lock()
                .unwrap()
                .push(request.header(AUTHORIZATION).map(str::to_string));
            let status = self.status;
            Box::pin(async move { Ok(ResponseDescriptor::new(status, "")) })
        }
    }

    fn recording(status: u16) -> Arc<Recording> {
        Arc::new(Recording {
            status,
            seen: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_attaches_bearer_token() {
        let transport = recording(200);
        let pipeline = RequestPipeline::builder(transport.clone())
            .stage(AuthStage::new(Arc::new(|| Some("s3cret".to_string()))))
            .build();

        pipeline
            .execute(PipelineRequest::new(RequestDescriptor::get("/me")))
            .await
            .unwrap();
        assert_eq!(
            transport.seen.lock().unwrap().as_slice(),
            &[Some("Bearer s3cret".to_string())]
        );
    }

    #[tokio::test]
    async fn test_keeps_explicit_header() {
        let transport = recording(200);
        let pipeline = RequestPipeline::builder(transport.clone())
            .stage(AuthStage::new(Arc::new(|| Some("s3cret".to_string()))))
            .build();

        let descriptor = RequestDescriptor::get("/me").with_header("Authorization", "Basic abc");
        pipeline.execute(PipelineRequest::new(descriptor)).await.unwrap();
        assert_eq!(
            transport.seen.lock().unwrap().as_slice(),
            &[Some("Basic abc".to_string())]
        );
    }

    #[tokio::test]
    async fn test_no_credentials_sends_nothing() {
        let transport = recording(200);
        let pipeline = RequestPipeline::builder(transport.clone())
            .stage(AuthStage::new(Arc::new(NoCredentials)))
            .build();

        pipeline
            .execute(PipelineRequest::new(RequestDescriptor::get("/")))
            .await
            .unwrap();
        assert_eq!(transport.seen.lock().unwrap().as_slice(), &[None]);
    }

    #[tokio::test]
    async fn test_unauthorized_is_terminal() {
        let transport = recording(401);
        let pipeline = RequestPipeline::builder(transport.clone())
            .stage(RetryStage::new(RetryPolicy::new(
                3,
                Duration::from_millis(5),
                Duration::from_millis(5),
            )))
            .stage(AuthStage::new(Arc::new(|| Some("expired".to_string()))))
            .stage(ErrorMappingStage)
            .build();

        let result = pipeline.execute(PipelineRequest::new(RequestDescriptor::get("/"))).await;
        assert_eq!(result, Err(NetworkError::Unauthorized));
        assert_eq!(transport.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unauthorized_detection() {
        assert!(is_unauthorized(&Ok(ResponseDescriptor::new(401, ""))));
        assert!(is_unauthorized(&Err(StageError::Transport(TransportError::Status {
            status: 401,
            body: String::new(),
        }))));
        assert!(is_unauthorized(&Err(NetworkError::Unauthorized.into())));
        assert!(!is_unauthorized(&Ok(ResponseDescriptor::new(403, ""))));
    }
}
