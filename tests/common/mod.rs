//! In-memory assistant service shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use assistant_chat::assistant::{
    AssistantApi, AssistantProfile, AssistantUpdate, ContentPart, CreateRun, MessagePage,
    MessageRole, Run, RunError, RunStatus, Thread, ThreadMessage,
};
use assistant_chat::error::{ChatError, Result};

pub const ASSISTANT_ID: &str = "asst_test";

pub fn profile() -> AssistantProfile {
    AssistantProfile {
        id: ASSISTANT_ID.to_string(),
        name: Some("Lawyer".to_string()),
        instructions: Some("Answer legal questions.".to_string()),
        model: "gpt-4-1106-preview".to_string(),
        tools: vec![serde_json::json!({ "type": "code_interpreter" })],
        file_ids: vec!["file-law".to_string()],
    }
}

#[derive(Debug, Default)]
pub struct Calls {
    pub retrieve_assistant: AtomicUsize,
    pub update_assistant: AtomicUsize,
    pub create_thread: AtomicUsize,
    pub create_message: AtomicUsize,
    pub create_run: AtomicUsize,
    pub retrieve_run: AtomicUsize,
    pub list_messages: AtomicUsize,
    pub file_content: AtomicUsize,
}

impl Calls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct RunState {
    thread_id: String,
    polls: usize,
    replied: bool,
}

#[derive(Debug, Default)]
struct State {
    /// Newest first, like the remote listing.
    threads: HashMap<String, Vec<ThreadMessage>>,
    runs: HashMap<String, RunState>,
    next_id: usize,
}

/// Scripted fake of the remote service.
///
/// Every run walks through `script`: `create_run` returns the first status,
/// each `retrieve_run` the next one, repeating the last forever. When a run
/// first reports `completed` the assistant reply is appended to its thread.
#[derive(Debug)]
pub struct FakeApi {
    pub calls: Calls,
    script: Vec<RunStatus>,
    reply: Vec<ContentPart>,
    files: HashMap<String, Vec<u8>>,
    page_size: usize,
    state: Mutex<State>,
    /// The assistant as stored on the service.
    assistant: Mutex<AssistantProfile>,
    /// Instructions carried by every update, in order.
    pub pushed_instructions: Mutex<Vec<Option<String>>>,
}

impl FakeApi {
    pub fn new(script: Vec<RunStatus>) -> Self {
        Self {
            calls: Calls::default(),
            script,
            reply: Vec::new(),
            files: HashMap::new(),
            page_size: 100,
            state: Mutex::new(State::default()),
            assistant: Mutex::new(profile()),
            pushed_instructions: Mutex::new(Vec::new()),
        }
    }

    /// queued → in_progress → completed
    pub fn completing() -> Self {
        Self::new(vec![RunStatus::Queued, RunStatus::InProgress, RunStatus::Completed])
    }

    /// Reply with these parts instead of echoing the user's text.
    pub fn with_reply(mut self, reply: Vec<ContentPart>) -> Self {
        self.reply = reply;
        self
    }

    pub fn with_file(mut self, file_id: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(file_id.to_string(), bytes);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Put a message on a thread directly, as another client would.
    pub fn seed_message(&self, thread_id: &str, role: MessageRole, text: &str) {
        let mut state = self.state.lock().unwrap();
        let id = next_id(&mut state, "msg");
        let message = text_message(&id, role, text, id_number(&id));
        state
            .threads
            .entry(thread_id.to_string())
            .or_default()
            .insert(0, message);
    }

    /// Edit the assistant on the service, as an operator would.
    pub fn edit_instructions(&self, instructions: &str) {
        self.assistant.lock().unwrap().instructions = Some(instructions.to_string());
    }

    pub fn remote_assistant(&self) -> AssistantProfile {
        self.assistant.lock().unwrap().clone()
    }

    pub fn thread_count(&self) -> usize {
        self.state.lock().unwrap().threads.len()
    }

    fn status_at(&self, index: usize) -> RunStatus {
        self.script
            .get(index)
            .or_else(|| self.script.last())
            .copied()
            .unwrap_or(RunStatus::Completed)
    }

    fn run_view(&self, run_id: &str, thread_id: &str, status: RunStatus) -> Run {
        Run {
            id: run_id.to_string(),
            thread_id: thread_id.to_string(),
            status,
            last_error: status.is_failure().then(|| RunError {
                code: Some("server_error".to_string()),
                message: format!("run ended as {status}"),
            }),
        }
    }

    fn reply_for(&self, state: &mut State, thread_id: &str) {
        let id = next_id(state, "msg");
        let thread = state.threads.entry(thread_id.to_string()).or_default();
        let content = if self.reply.is_empty() {
            let question = thread
                .iter()
                .find(|m| m.role == MessageRole::User)
                .and_then(|m| match m.content.first() {
                    Some(ContentPart::Text { value }) => Some(value.clone()),
                    _ => None,
                })
                .unwrap_or_default();
            vec![ContentPart::Text {
                value: format!("Reply to: {question}"),
            }]
        } else {
            self.reply.clone()
        };
        thread.insert(
            0,
            ThreadMessage {
                created_at: id_number(&id),
                id,
                role: MessageRole::Assistant,
                content,
            },
        );
    }
}

fn next_id(state: &mut State, prefix: &str) -> String {
    state.next_id += 1;
    format!("{prefix}_{}", state.next_id)
}

fn id_number(id: &str) -> i64 {
    id.rsplit('_').next().and_then(|n| n.parse().ok()).unwrap_or(0)
}

pub fn text_message(id: &str, role: MessageRole, text: &str, created_at: i64) -> ThreadMessage {
    ThreadMessage {
        id: id.to_string(),
        role,
        content: vec![ContentPart::Text {
            value: text.to_string(),
        }],
        created_at,
    }
}

#[async_trait::async_trait]
impl AssistantApi for FakeApi {
    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<AssistantProfile> {
        self.calls.retrieve_assistant.fetch_add(1, Ordering::SeqCst);
        if assistant_id == ASSISTANT_ID {
            Ok(self.remote_assistant())
        } else {
            Err(ChatError::RemoteLookup {
                assistant_id: assistant_id.to_string(),
                message: "No assistant found".to_string(),
            })
        }
    }

    async fn update_assistant(
        &self,
        assistant_id: &str,
        update: &AssistantUpdate,
    ) -> Result<AssistantProfile> {
        self.calls.update_assistant.fetch_add(1, Ordering::SeqCst);
        self.pushed_instructions
            .lock()
            .unwrap()
            .push(update.instructions.clone());
        let updated = AssistantProfile {
            id: assistant_id.to_string(),
            name: update.name.clone(),
            instructions: update.instructions.clone(),
            model: update.model.clone(),
            tools: update.tools.clone(),
            file_ids: update.file_ids.clone(),
        };
        *self.assistant.lock().unwrap() = updated.clone();
        Ok(updated)
    }

    async fn create_thread(&self) -> Result<Thread> {
        self.calls.create_thread.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let id = next_id(&mut state, "thread");
        state.threads.insert(id.clone(), Vec::new());
        Ok(Thread { id })
    }

    async fn create_message(&self, thread_id: &str, content: &str) -> Result<ThreadMessage> {
        self.calls.create_message.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let id = next_id(&mut state, "msg");
        let message = text_message(&id, MessageRole::User, content, id_number(&id));
        state
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| ChatError::RemoteCall {
                operation: "create_message",
                status: 404,
                message: format!("No thread found with id '{thread_id}'."),
            })?
            .insert(0, message.clone());
        Ok(message)
    }

    async fn create_run(&self, thread_id: &str, request: &CreateRun) -> Result<Run> {
        self.calls.create_run.fetch_add(1, Ordering::SeqCst);
        assert_eq!(request.assistant_id, ASSISTANT_ID);
        let mut state = self.state.lock().unwrap();
        let id = next_id(&mut state, "run");
        let status = self.status_at(0);
        let mut run_state = RunState {
            thread_id: thread_id.to_string(),
            ..RunState::default()
        };
        if status == RunStatus::Completed {
            run_state.replied = true;
            self.reply_for(&mut state, thread_id);
        }
        state.runs.insert(id.clone(), run_state);
        Ok(self.run_view(&id, thread_id, status))
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        self.calls.retrieve_run.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let run = state.runs.get_mut(run_id).ok_or_else(|| ChatError::RemoteCall {
            operation: "retrieve_run",
            status: 404,
            message: format!("No run found with id '{run_id}'."),
        })?;
        assert_eq!(run.thread_id, thread_id);
        run.polls += 1;
        let status = self.status_at(run.polls);
        let reply = status == RunStatus::Completed && !run.replied;
        if reply {
            run.replied = true;
            self.reply_for(&mut state, thread_id);
        }
        Ok(self.run_view(run_id, thread_id, status))
    }

    async fn list_messages(&self, thread_id: &str, after: Option<&str>) -> Result<MessagePage> {
        self.calls.list_messages.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        let thread = state.threads.get(thread_id).cloned().unwrap_or_default();
        let start = match after {
            Some(cursor) => thread
                .iter()
                .position(|m| m.id == cursor)
                .map_or(thread.len(), |i| i + 1),
            None => 0,
        };
        let data: Vec<ThreadMessage> = thread.iter().skip(start).take(self.page_size).cloned().collect();
        Ok(MessagePage {
            has_more: start + data.len() < thread.len(),
            last_id: data.last().map(|m| m.id.clone()),
            data,
        })
    }

    async fn file_content(&self, file_id: &str) -> Result<Vec<u8>> {
        self.calls.file_content.fetch_add(1, Ordering::SeqCst);
        self.files.get(file_id).cloned().ok_or_else(|| ChatError::RemoteCall {
            operation: "file_content",
            status: 404,
            message: format!("No such file object: {file_id}"),
        })
    }
}
