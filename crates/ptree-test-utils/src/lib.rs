//! Testing utilities for the ptree workspace
//!
//! Fake generators, canned responses and tree fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use ptree_core::{CoreError, Generator, MemoryStore, PtreeConfig, Result, SamplingParams, Tenant, Workspace};
use ptree_model::{Candidate, Change, Feedback, NodeId, Tree};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// One recorded `generate` call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateCall {
    pub system: String,
    pub prompt: String,
    pub feedback: Vec<Feedback>,
}

/// One recorded `run` call
#[derive(Debug, Clone, PartialEq)]
pub struct RunCall {
    pub prompt: String,
    pub params: SamplingParams,
}

/// Generator answering from a queue of scripted responses
///
/// `generate` and `run` share the queue. An exhausted queue answers with
/// a transport failure.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<Result<String>>>,
    title: Mutex<Option<String>>,
    calls: Mutex<Vec<GenerateCall>>,
    runs: Mutex<Vec<RunCall>>,
    latency: Mutex<Duration>,
}

impl ScriptedGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_response(self, raw: impl Into<String>) -> Self {
        self.responses.lock().push_back(Ok(raw.into()));
        self
    }

    #[must_use]
    pub fn with_failure(self, message: &str) -> Self {
        self.responses.lock().push_back(Err(CoreError::transport(message)));
        self
    }

    #[must_use]
    pub fn with_title(self, title: impl Into<String>) -> Self {
        *self.title.lock() = Some(title.into());
        self
    }

    /// Sleep this long (on the tokio clock) before every `generate` answer
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock() = latency;
        self
    }

    pub fn push_response(&self, raw: impl Into<String>) {
        self.responses.lock().push_back(Ok(raw.into()));
    }

    #[must_use]
    pub fn calls(&self) -> Vec<GenerateCall> {
        self.calls.lock().clone()
    }

    #[must_use]
    pub fn runs(&self) -> Vec<RunCall> {
        self.runs.lock().clone()
    }

    fn next_response(&self, missing: &str) -> Result<String> {
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(CoreError::transport(missing)))
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, system: &str, prompt: &str, feedback: &[Feedback]) -> Result<String> {
        self.calls.lock().push(GenerateCall {
            system: system.to_string(),
            prompt: prompt.to_string(),
            feedback: feedback.to_vec(),
        });
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.next_response("no scripted response left")
    }

    async fn name_tree(&self, _initial_prompt: &str, _analyses: &[String]) -> Result<String> {
        self.title
            .lock()
            .clone()
            .ok_or_else(|| CoreError::transport("no scripted title"))
    }

    async fn run(&self, prompt: &str, params: &SamplingParams) -> Result<String> {
        self.runs.lock().push(RunCall {
            prompt: prompt.to_string(),
            params: params.clone(),
        });
        self.next_response("no scripted output left")
    }
}

/// Generator whose every call fails at the transport layer
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    async fn generate(&self, _: &str, _: &str, _: &[Feedback]) -> Result<String> {
        Err(CoreError::transport("connection refused"))
    }

    async fn name_tree(&self, _: &str, _: &[String]) -> Result<String> {
        Err(CoreError::transport("connection refused"))
    }

    async fn run(&self, _: &str, _: &SamplingParams) -> Result<String> {
        Err(CoreError::transport("connection refused"))
    }
}

/// XML response with options `improvement-1..=n`
#[must_use]
pub fn improvement_response(n: usize) -> String {
    let options: String = (1..=n)
        .map(|i| {
            format!(
                "<option id=\"improvement-{i}\">\
                   <text>Improved prompt {i}</text>\
                   <analysis>Analysis {i}</analysis>\
                   <changes><change><description>Change {i}</description><rationale>Because {i}</rationale></change></changes>\
                 </option>"
            )
        })
        .collect();
    format!("<result><options>{options}</options></result>")
}

/// XML response echoing the reserved scaffolding options next to `n` real ones
#[must_use]
pub fn response_with_scaffolding(n: usize) -> String {
    let scaffolding = ["original", "implementation", "verification"]
        .iter()
        .map(|id| format!("<option id=\"{id}\"><text>{id} text</text></option>"))
        .collect::<String>();
    improvement_response(n).replacen("<options>", &format!("<options>{scaffolding}"), 1)
}

/// Candidates with the given texts
#[must_use]
pub fn candidates(texts: &[&str]) -> Vec<Candidate> {
    texts
        .iter()
        .map(|t| Candidate::new(*t, format!("analysis of {t}"), vec![Change::new("edit", "reason")]))
        .collect()
}

/// A root with `fanout` children, each with `fanout` grandchildren
#[must_use]
pub fn two_level_tree(prompt: &str, fanout: usize) -> Tree {
    let mut tree = Tree::from_prompt(prompt).unwrap();
    let root = tree.root().unwrap().id.clone();
    let texts: Vec<String> = (0..fanout).map(|i| format!("child {i}")).collect();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let children = tree.attach_candidates(&root, candidates(&refs)).unwrap();
    for (i, child) in children.iter().enumerate() {
        let texts: Vec<String> = (0..fanout).map(|j| format!("grandchild {i}.{j}")).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        tree.attach_candidates(child, candidates(&refs)).unwrap();
    }
    tree
}

/// Id of the root node
#[must_use]
pub fn root_id(tree: &Tree) -> NodeId {
    tree.root().unwrap().id.clone()
}

/// Workspace over a fresh memory store for tenant `u`/`acme`
pub fn memory_workspace(generator: Arc<dyn Generator>) -> (Workspace, Arc<MemoryStore>) {
    memory_workspace_with(generator, PtreeConfig::default())
}

pub fn memory_workspace_with(generator: Arc<dyn Generator>, config: PtreeConfig) -> (Workspace, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let workspace = Workspace::new(Tenant::new("u", "acme"), config, generator, store.clone());
    (workspace, store)
}
