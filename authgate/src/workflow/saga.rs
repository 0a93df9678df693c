//! Ordered reversible steps with compensation on failure.
//!
//! A [`Saga`] runs its steps in order against a shared context. When a step fails, every step
//! that already completed is compensated in reverse order and the original error is returned.
//! The failed step itself is never compensated. If a compensation fails, the remaining
//! compensations still run and the caller gets an internal error describing both failures.

use tracing::{error, warn};

use crate::errors::{Error, Result};

#[async_trait::async_trait]
pub trait Step<C: Send>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, ctx: &mut C) -> Result<()>;

    async fn compensate(&self, ctx: &mut C) -> Result<()>;
}

pub struct Saga<C> {
    steps: Vec<Box<dyn Step<C>>>,
}

impl<C: Send> Default for Saga<C> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<C: Send> Saga<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, step: impl Step<C> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub async fn run(&self, ctx: &mut C) -> Result<()> {
        for (index, step) in self.steps.iter().enumerate() {
            let Err(err) = step.execute(ctx).await else {
                continue;
            };
            warn!(step = step.name(), error = %err, "Saga step failed, compensating");

            let mut compensation_failures = Vec::new();
            for done in self.steps[..index].iter().rev() {
                if let Err(undo_err) = done.compensate(ctx).await {
                    error!(
                        step = step.name(),
                        compensated_step = done.name(),
                        error = %err,
                        compensation_error = %undo_err,
                        "Saga compensation failed"
                    );
                    compensation_failures.push(format!("{}: {undo_err}", done.name()));
                }
            }

            if compensation_failures.is_empty() {
                return Err(err);
            }
            return Err(Error::Internal {
                operation: format!(
                    "{}: {err}; compensation also failed ({})",
                    step.name(),
                    compensation_failures.join(", ")
                ),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Log {
        events: Vec<String>,
    }

    struct Recorded {
        name: &'static str,
        fail_execute: bool,
        fail_compensate: bool,
    }

    impl Recorded {
        fn ok(name: &'static str) -> Self {
            Self {
                name,
                fail_execute: false,
                fail_compensate: false,
            }
        }
    }

    #[async_trait::async_trait]
    impl Step<Log> for Recorded {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn execute(&self, ctx: &mut Log) -> Result<()> {
            ctx.events.push(format!("do {}", self.name));
            if self.fail_execute {
                return Err(Error::BadRequest {
                    message: format!("{} failed", self.name),
                });
            }
            Ok(())
        }

        async fn compensate(&self, ctx: &mut Log) -> Result<()> {
            ctx.events.push(format!("undo {}", self.name));
            if self.fail_compensate {
                return Err(Error::Internal {
                    operation: format!("undo {}", self.name),
                });
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_all_steps_run_in_order() {
        let saga = Saga::new().step(Recorded::ok("a")).step(Recorded::ok("b"));
        let mut log = Log::default();

        saga.run(&mut log).await.unwrap();
        assert_eq!(log.events, vec!["do a", "do b"]);
    }

    #[tokio::test]
    async fn test_completed_steps_compensate_in_reverse() {
        let saga = Saga::new().step(Recorded::ok("a")).step(Recorded::ok("b")).step(Recorded {
            fail_execute: true,
            ..Recorded::ok("c")
        });
        let mut log = Log::default();

        let err = saga.run(&mut log).await.unwrap_err();
        assert!(matches!(err, Error::BadRequest { .. }));
        assert_eq!(log.events, vec!["do a", "do b", "do c", "undo b", "undo a"]);
    }

    #[tokio::test]
    async fn test_first_step_failure_compensates_nothing() {
        let saga = Saga::new()
            .step(Recorded {
                fail_execute: true,
                ..Recorded::ok("a")
            })
            .step(Recorded::ok("b"));
        let mut log = Log::default();

        assert!(saga.run(&mut log).await.is_err());
        assert_eq!(log.events, vec!["do a"]);
    }

    #[tokio::test]
    async fn test_failed_compensation_surfaces_both_errors() {
        let saga = Saga::new()
            .step(Recorded::ok("a"))
            .step(Recorded {
                fail_compensate: true,
                ..Recorded::ok("b")
            })
            .step(Recorded {
                fail_execute: true,
                ..Recorded::ok("c")
            });
        let mut log = Log::default();

        let err = saga.run(&mut log).await.unwrap_err();
        let Error::Internal { operation } = err else {
            panic!("expected internal error");
        };
        assert!(operation.contains("c failed"));
        assert!(operation.contains("b: Failed to undo b"));
        // The remaining compensation still ran
        assert_eq!(log.events, vec!["do a", "do b", "do c", "undo b", "undo a"]);
    }
}
