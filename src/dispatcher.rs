//! Accumulates and executes ordered batches of create/update/delete
//! actions against LB sub-resources. Grounded on
//! `original_source/src/manager/actions.go` (`ActionDispacther`).

use std::future::Future;
use std::pin::Pin;

use crate::error::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verb {
    Create,
    Update,
    Delete,
}

pub type ActionFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

struct Action {
    verb: Verb,
    subject: String,
    future: Option<ActionFuture>,
}

/// At-most-once action queue: actions are registered up front (by the
/// per-kind diff/build logic) and executed in fixed batches by
/// `run`. A finished action is never re-run, even across multiple `run`
/// calls with overlapping filters.
#[derive(Default)]
pub struct ActionDispatcher {
    actions: Vec<Action>,
}

impl ActionDispatcher {
    pub fn new() -> ActionDispatcher {
        ActionDispatcher { actions: Vec::new() }
    }

    pub fn add(&mut self, verb: Verb, subject: impl Into<String>, future: ActionFuture) {
        self.actions.push(Action {
            verb,
            subject: subject.into(),
            future: Some(future),
        });
    }

    /// Executes all not-yet-run actions matching `verb` and, if
    /// non-empty, one of `subjects`; an empty `subjects` matches every
    /// subject tag. Actions run sequentially in registration order —
    /// the ordering across sub-resource kinds is itself load-bearing
    /// (§4.5), so this never parallelizes.
    pub async fn run(&mut self, verb: Verb, subjects: &[&str]) -> Result<()> {
        for action in &mut self.actions {
            if action.verb != verb {
                continue;
            }
            if !subjects.is_empty() && !subjects.contains(&action.subject.as_str()) {
                continue;
            }
            if let Some(future) = action.future.take() {
                future.await?;
            }
        }
        Ok(())
    }

    pub fn pending_count(&self) -> usize {
        self.actions.iter().filter(|a| a.future.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn recording_action(log: Arc<std::sync::Mutex<Vec<String>>>, label: &str) -> ActionFuture {
        let label = label.to_string();
        Box::pin(async move {
            log.lock().unwrap().push(label);
            Ok(())
        })
    }

    #[tokio::test]
    async fn runs_matching_verb_and_subject_in_registration_order() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut d = ActionDispatcher::new();
        d.add(Verb::Create, "routingpolicy", recording_action(log.clone(), "policy1"));
        d.add(Verb::Create, "hostname", recording_action(log.clone(), "hostname1"));
        d.add(Verb::Delete, "routingpolicy", recording_action(log.clone(), "deleted-policy"));

        d.run(Verb::Create, &[]).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["policy1", "hostname1"]);
    }

    #[tokio::test]
    async fn filters_by_subject_when_given() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut d = ActionDispatcher::new();
        d.add(Verb::Update, "routingpolicy", recording_action(log.clone(), "policy-update"));
        d.add(Verb::Update, "ruleset", recording_action(log.clone(), "ruleset-update"));

        d.run(Verb::Update, &["routingpolicy"]).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["policy-update"]);
    }

    #[tokio::test]
    async fn actions_are_at_most_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let mut d = ActionDispatcher::new();
        d.add(
            Verb::Create,
            "hostname",
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        d.run(Verb::Create, &[]).await.unwrap();
        d.run(Verb::Create, &[]).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn propagates_action_errors() {
        let mut d = ActionDispatcher::new();
        d.add(
            Verb::Delete,
            "certificate",
            Box::pin(async move { Err(crate::error::Error::InvalidInput("boom".into())) }),
        );
        assert!(d.run(Verb::Delete, &[]).await.is_err());
    }
}
