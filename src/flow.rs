use futures::future::BoxFuture;
use serde_json::{json, Map, Value};
use tracing::error;

use crate::error::Result;

type StepFuture = BoxFuture<'static, Result<Map<String, Value>>>;
type StepFn = Box<dyn Fn(Map<String, Value>) -> StepFuture + Send + Sync>;

/// One named unit of work in a flow. The handler receives a snapshot of
/// the accumulated data map and returns the entries it contributes.
pub struct FlowStep {
    name: String,
    requires: Vec<String>,
    handler: StepFn,
}

impl FlowStep {
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Map<String, Value>) -> StepFuture + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            requires: Vec::new(),
            handler: Box::new(handler),
        }
    }

    /// Names of steps that must have a recorded result, successful or not,
    /// before this one runs.
    pub fn requires<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Runs steps in registration order, threading an accumulating data map
/// through them. A failed step records an error result and the flow moves
/// on; it never aborts the remaining steps.
#[derive(Default)]
pub struct FlowManager {
    steps: Vec<FlowStep>,
}

impl FlowManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_step(&mut self, step: FlowStep) {
        self.steps.push(step);
    }

    pub fn step_names(&self) -> Vec<String> {
        self.steps.iter().map(|step| step.name.clone()).collect()
    }

    /// Executes every step against `input`. Each successful step's output
    /// is merged into the shared data map and recorded under the step name;
    /// failures are recorded as `{"error": ...}` objects instead.
    pub async fn execute(&self, input: Map<String, Value>) -> Map<String, Value> {
        let mut data = input;
        let mut results = Map::new();

        for step in &self.steps {
            if let Some(missing) = step
                .requires
                .iter()
                .find(|name| !results.contains_key(name.as_str()))
            {
                error!("flow step `{}` skipped: missing required step result `{missing}`", step.name);
                results.insert(
                    step.name.clone(),
                    json!({"error": format!("missing required step result: {missing}")}),
                );
                continue;
            }

            match (step.handler)(data.clone()).await {
                Ok(output) => {
                    data.extend(output.clone());
                    results.insert(step.name.clone(), Value::Object(output));
                }
                Err(err) => {
                    error!("flow step `{}` failed: {err}", step.name);
                    results.insert(step.name.clone(), json!({"error": err.to_string()}));
                }
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarrierError;

    fn constant_step(name: &str, key: &str, value: &str) -> FlowStep {
        let key = key.to_string();
        let value = value.to_string();
        FlowStep::new(name, move |_data| {
            let key = key.clone();
            let value = value.clone();
            Box::pin(async move {
                let mut out = Map::new();
                out.insert(key, json!(value));
                Ok(out)
            })
        })
    }

    #[tokio::test]
    async fn accumulates_data_across_steps() {
        let mut flow = FlowManager::new();
        flow.add_step(constant_step("research", "research", "three key facts"));
        flow.add_step(
            FlowStep::new("write", |data| {
                Box::pin(async move {
                    let notes = data
                        .get("research")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    let mut out = Map::new();
                    out.insert("draft".to_string(), json!(format!("draft from: {notes}")));
                    Ok(out)
                })
            })
            .requires(["research"]),
        );

        let mut input = Map::new();
        input.insert("topic".to_string(), json!("crabs"));
        let results = flow.execute(input).await;

        assert_eq!(results["research"]["research"], json!("three key facts"));
        assert_eq!(
            results["write"]["draft"],
            json!("draft from: three key facts")
        );
    }

    #[tokio::test]
    async fn failed_step_records_error_and_flow_continues() {
        let mut flow = FlowManager::new();
        flow.add_step(constant_step("research", "research", "notes"));
        flow.add_step(
            FlowStep::new("write", |_data| {
                Box::pin(async { Err(HarrierError::Model("writer offline".into())) })
            })
            .requires(["research"]),
        );
        flow.add_step(
            FlowStep::new("edit", |data| {
                Box::pin(async move {
                    // The draft never arrived, so fall back to raw notes.
                    let source = data
                        .get("draft")
                        .or_else(|| data.get("research"))
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    let mut out = Map::new();
                    out.insert("edited".to_string(), json!(format!("polished: {source}")));
                    Ok(out)
                })
            })
            .requires(["write"]),
        );

        let results = flow.execute(Map::new()).await;

        assert!(results["write"]["error"]
            .as_str()
            .unwrap()
            .contains("writer offline"));
        // "write" has a result recorded, so "edit" still ran.
        assert_eq!(results["edit"]["edited"], json!("polished: notes"));
    }

    #[tokio::test]
    async fn missing_requirement_is_an_error_result() {
        let mut flow = FlowManager::new();
        flow.add_step(constant_step("late", "x", "y").requires(["never-ran"]));

        let results = flow.execute(Map::new()).await;

        assert!(results["late"]["error"]
            .as_str()
            .unwrap()
            .contains("missing required step result: never-ran"));
    }

    #[tokio::test]
    async fn input_reaches_the_first_step() {
        let mut flow = FlowManager::new();
        flow.add_step(FlowStep::new("intake", |data| {
            Box::pin(async move {
                let topic = data.get("topic").and_then(Value::as_str).unwrap_or("none");
                let mut out = Map::new();
                out.insert("seen".to_string(), json!(topic));
                Ok(out)
            })
        }));

        let mut input = Map::new();
        input.insert("topic".to_string(), json!("tides"));
        let results = flow.execute(input).await;

        assert_eq!(results["intake"]["seen"], json!("tides"));
        assert_eq!(flow.step_names(), vec!["intake".to_string()]);
    }
}
