//! Interpreter - Execute Effects using a Provider
//!
//! Executes one Effect at a time. The caller decides what happens between
//! effects (persisting state, stopping at the first failure).

use crate::effect::Effect;
use crate::error::{ProviderError, ProviderResult};
use crate::provider::Provider;
use crate::resource::{ResourceId, State};

/// Result of executing each Effect
#[derive(Debug)]
pub enum EffectOutcome {
    Read { state: State },
    Created { state: State },
    Updated { state: State },
    Deleted { id: ResourceId },
}

/// Interpreter that executes Effects using a Provider
pub struct Interpreter<P: Provider> {
    provider: P,
}

impl<P: Provider> Interpreter<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Execute a single Effect
    pub async fn execute(&self, effect: &Effect) -> ProviderResult<EffectOutcome> {
        match effect {
            Effect::Read { id, identifier } => {
                let state = self.provider.read(id, identifier.as_deref()).await?;
                Ok(EffectOutcome::Read { state })
            }
            Effect::Create(resource) => {
                let state = self.provider.create(resource).await?;
                Ok(EffectOutcome::Created { state })
            }
            Effect::Update { id, from, to } => {
                let identifier = from.identifier.as_deref().ok_or_else(|| {
                    ProviderError::invalid_configuration("no identifier recorded for update")
                        .for_resource(id.clone())
                })?;
                let state = self.provider.update(id, identifier, from, to).await?;
                Ok(EffectOutcome::Updated { state })
            }
            Effect::Delete { id, identifier } => {
                self.provider.delete(id, identifier).await?;
                Ok(EffectOutcome::Deleted { id: id.clone() })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::error::ErrorKind;
    use crate::provider::BoxFuture;
    use crate::resource::Resource;

    struct TestProvider;

    impl Provider for TestProvider {
        fn name(&self) -> &'static str {
            "test"
        }

        fn resource_types(&self) -> Vec<&'static str> {
            vec!["test.thing"]
        }

        fn read(
            &self,
            id: &ResourceId,
            _identifier: Option<&str>,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            let id = id.clone();
            Box::pin(async move { Ok(State::not_found(id)) })
        }

        fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
            let result = if resource.id.name == "broken" {
                Err(ProviderError::api("ValidationException"))
            } else {
                Ok(State::existing(resource.id.clone(), resource.attributes.clone())
                    .with_identifier("env-1,thing"))
            };
            Box::pin(async move { result })
        }

        fn update(
            &self,
            id: &ResourceId,
            _identifier: &str,
            _from: &State,
            to: &Resource,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            let state = State::existing(id.clone(), to.attributes.clone());
            Box::pin(async move { Ok(state) })
        }

        fn delete(&self, _id: &ResourceId, _identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[tokio::test]
    async fn create_returns_settled_state() {
        let effect = Effect::Create(Resource::new("test.thing", "fine"));

        let outcome = Interpreter::new(TestProvider).execute(&effect).await.unwrap();

        match outcome {
            EffectOutcome::Created { state } => {
                assert_eq!(state.identifier.as_deref(), Some("env-1,thing"));
            }
            other => panic!("expected Created, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn provider_error_is_returned() {
        let effect = Effect::Create(Resource::new("test.thing", "broken"));
        let err = Interpreter::new(TestProvider).execute(&effect).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Api);
    }

    #[tokio::test]
    async fn delete_reports_the_deleted_resource() {
        let id = ResourceId::new("test.thing", "a");
        let effect = Effect::Delete {
            id: id.clone(),
            identifier: "env-1,a".to_string(),
        };

        let outcome = Interpreter::new(TestProvider).execute(&effect).await.unwrap();

        assert!(matches!(outcome, EffectOutcome::Deleted { id: deleted } if deleted == id));
    }

    #[tokio::test]
    async fn update_without_identifier_is_rejected() {
        let id = ResourceId::new("test.thing", "a");
        let effect = Effect::Update {
            id: id.clone(),
            from: State::existing(id, HashMap::new()),
            to: Resource::new("test.thing", "a"),
        };

        let err = Interpreter::new(TestProvider).execute(&effect).await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::InvalidConfiguration);
    }
}
