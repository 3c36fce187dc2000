//! Sequential step tracer for generated documents.
//!
//! Walks an action sequence with a program counter, using jump tables built
//! from group identifiers, against a [`Host`] that stands in for the device:
//! share input, clipboard and network. Every observable side effect is
//! recorded as an [`Event`]. Only the fixed action catalog is understood.

use crate::action::{self, Action, ActionKind, Condition, ControlFlowMode, Param};
use crate::document::Document;
use crate::error::{Result, ShortcutError};
use crate::outline::ActionOutline;
use crate::validate;
use crate::value::{ContentType, KeyedMapping, Reference, TypedValue};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Upper bound on executed steps; a run past it is reported as an error.
pub const MAX_STEPS: usize = 10_000;

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RunValue {
    Nothing,
    Text(String),
    Url(String),
    Json(serde_json::Value),
    Media { source: String },
}

impl RunValue {
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => RunValue::Nothing,
            serde_json::Value::String(s) => RunValue::Text(s.clone()),
            serde_json::Value::Bool(b) => RunValue::Text(b.to_string()),
            serde_json::Value::Number(n) => RunValue::Text(n.to_string()),
            other => RunValue::Json(other.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RunValue::Nothing => true,
            RunValue::Text(s) | RunValue::Url(s) => s.is_empty(),
            RunValue::Json(v) => v.is_null(),
            RunValue::Media { .. } => false,
        }
    }

    /// Text rendering, as used when a value is embedded into a string.
    pub fn as_text(&self) -> String {
        match self {
            RunValue::Nothing => String::new(),
            RunValue::Text(s) | RunValue::Url(s) => s.clone(),
            RunValue::Json(v) => v.to_string(),
            RunValue::Media { source } => source.clone(),
        }
    }

    fn coerce(self, target: ContentType) -> Self {
        match (target, self) {
            (ContentType::Url, RunValue::Text(s)) => RunValue::Url(s),
            (ContentType::Text, RunValue::Url(s)) => RunValue::Text(s),
            (_, v) => v,
        }
    }

    /// Dictionary view: JSON objects directly, or text that parses as one.
    fn as_object(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
        let parsed;
        let value = match self {
            RunValue::Json(v) => v,
            RunValue::Text(s) => {
                parsed = serde_json::from_str::<serde_json::Value>(s).ok()?;
                &parsed
            }
            _ => return None,
        };
        value.as_object().cloned()
    }
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchRequest {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub json: Option<serde_json::Value>,
}

/// The device side of a run.
pub trait Host {
    fn shortcut_input(&self) -> Option<String>;
    fn clipboard(&self) -> Option<String>;
    fn fetch(&mut self, request: &FetchRequest) -> Result<RunValue>;
}

/// Host with fixed input and clipboard that answers the extraction endpoint
/// with a canned JSON document and every other URL with media.
#[derive(Debug, Clone)]
pub struct ScriptedHost {
    pub input: Option<String>,
    pub clipboard: Option<String>,
    pub api_url: String,
    pub response: serde_json::Value,
}

impl ScriptedHost {
    pub fn new(api_url: impl Into<String>, response: serde_json::Value) -> Self {
        Self {
            input: None,
            clipboard: None,
            api_url: api_url.into(),
            response,
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn with_clipboard(mut self, clipboard: impl Into<String>) -> Self {
        self.clipboard = Some(clipboard.into());
        self
    }
}

impl Host for ScriptedHost {
    fn shortcut_input(&self) -> Option<String> {
        self.input.clone()
    }

    fn clipboard(&self) -> Option<String> {
        self.clipboard.clone()
    }

    fn fetch(&mut self, request: &FetchRequest) -> Result<RunValue> {
        if request.method == "POST" && request.url == self.api_url {
            return Ok(RunValue::Json(self.response.clone()));
        }
        Ok(RunValue::Media {
            source: request.url.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Trace
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    RequestSent {
        url: String,
        body: Option<serde_json::Value>,
    },
    MediaFetched {
        url: String,
    },
    MediaSaved {
        source: String,
    },
    Alert {
        title: String,
        message: String,
    },
    Notification {
        title: String,
        body: String,
    },
    Preview {
        content: String,
    },
    ClipboardWritten {
        content: String,
    },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Trace {
    pub events: Vec<Event>,
    pub variables: BTreeMap<String, RunValue>,
    pub steps: usize,
}

impl Trace {
    pub fn saved_media(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::MediaSaved { source } => Some(source.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn fetched(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::MediaFetched { url } => Some(url.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn notifications(&self) -> Vec<(&str, &str)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Notification { title, body } => Some((title.as_str(), body.as_str())),
                _ => None,
            })
            .collect()
    }

    pub fn alerts(&self) -> Vec<(&str, &str)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Alert { title, message } => Some((title.as_str(), message.as_str())),
                _ => None,
            })
            .collect()
    }

    pub fn variable(&self, name: &str) -> Option<&RunValue> {
        self.variables.get(name)
    }
}

// ---------------------------------------------------------------------------
// Jump tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
struct Span {
    begin: usize,
    otherwise: Option<usize>,
    end: usize,
}

fn spans(actions: &[Action]) -> HashMap<Uuid, Span> {
    let mut spans: HashMap<Uuid, Span> = HashMap::new();
    for (i, a) in actions.iter().enumerate() {
        let Some(cf) = a.control else { continue };
        let span = spans.entry(cf.group).or_default();
        match cf.mode {
            ControlFlowMode::Begin => span.begin = i,
            ControlFlowMode::Else => span.otherwise = Some(i),
            ControlFlowMode::End => span.end = i,
        }
    }
    spans
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

struct Frame {
    group: Uuid,
    items: Vec<RunValue>,
    next: usize,
}

struct Runner<'a, H: Host> {
    host: &'a mut H,
    vars: HashMap<String, RunValue>,
    outputs: HashMap<Uuid, RunValue>,
    previous: RunValue,
    loops: Vec<Frame>,
    trace: Trace,
}

/// Run `document` against `host` from the first action to the last.
pub fn run<H: Host>(document: &Document, host: &mut H) -> Result<Trace> {
    let outlines: Vec<ActionOutline> = document.actions.iter().map(Action::outline).collect();
    validate::ensure_valid(&outlines)?;

    let actions = &document.actions;
    let spans = spans(actions);
    let mut runner = Runner {
        host,
        vars: HashMap::new(),
        outputs: HashMap::new(),
        previous: RunValue::Nothing,
        loops: Vec::new(),
        trace: Trace::default(),
    };

    let mut pc = 0;
    while pc < actions.len() {
        runner.trace.steps += 1;
        if runner.trace.steps > MAX_STEPS {
            return Err(ShortcutError::DryRun(format!(
                "gave up after {MAX_STEPS} steps"
            )));
        }
        let action = &actions[pc];
        pc = match action.control {
            Some(cf) => {
                let span = spans.get(&cf.group).copied().ok_or_else(|| {
                    ShortcutError::DryRun(format!("#{pc}: group has no span"))
                })?;
                runner.control(action, cf.group, cf.mode, span, pc)?
            }
            None => {
                let output = runner.step(action)?;
                if let Some(id) = action.uuid {
                    runner.outputs.insert(id, output.clone());
                }
                runner.previous = output;
                pc + 1
            }
        };
    }

    let mut trace = runner.trace;
    trace.variables = runner.vars.into_iter().collect();
    Ok(trace)
}

impl<H: Host> Runner<'_, H> {
    fn lookup(&self, reference: &Reference) -> RunValue {
        match reference {
            Reference::Variable(name) => self.vars.get(name).cloned().unwrap_or(RunValue::Nothing),
            Reference::Output { step, .. } => {
                self.outputs.get(step).cloned().unwrap_or(RunValue::Nothing)
            }
            Reference::ShortcutInput => self
                .host
                .shortcut_input()
                .map(RunValue::Text)
                .unwrap_or(RunValue::Nothing),
            Reference::Clipboard => self
                .host
                .clipboard()
                .map(RunValue::Text)
                .unwrap_or(RunValue::Nothing),
            Reference::RepeatItem => self
                .loops
                .last()
                .and_then(|f| f.items.get(f.next))
                .cloned()
                .unwrap_or(RunValue::Nothing),
        }
    }

    fn eval(&self, value: &TypedValue) -> RunValue {
        match value {
            TypedValue::Literal(s) => RunValue::Text(s.clone()),
            TypedValue::Text(r) => RunValue::Text(self.lookup(r).as_text()),
            TypedValue::Direct {
                reference,
                coercion,
            } => {
                let v = self.lookup(reference);
                match coercion {
                    Some(target) => v.coerce(*target),
                    None => v,
                }
            }
        }
    }

    /// `WFInput`, or the previous output when the parameter is absent.
    fn input(&self, action: &Action) -> RunValue {
        match action.param(action::INPUT) {
            Some(Param::Value(v)) => self.eval(v),
            Some(Param::ConditionInput(r)) => self.lookup(r),
            _ => self.previous.clone(),
        }
    }

    fn text_param(&self, action: &Action, key: &str) -> String {
        match action.param(key) {
            Some(Param::Value(v)) => self.eval(v).as_text(),
            Some(p) => p.as_str().unwrap_or_default().to_string(),
            None => String::new(),
        }
    }

    fn mapping<'a>(&self, action: &'a Action, key: &str) -> Option<&'a KeyedMapping> {
        match action.param(key) {
            Some(Param::Mapping(m)) => Some(m),
            _ => None,
        }
    }

    fn step(&mut self, action: &Action) -> Result<RunValue> {
        match action.kind {
            ActionKind::SetVariable => {
                let name = self.text_param(action, action::VARIABLE_NAME);
                let value = self.input(action);
                self.vars.insert(name, value.clone());
                Ok(value)
            }
            ActionKind::GetClipboard => Ok(self
                .host
                .clipboard()
                .map(RunValue::Text)
                .unwrap_or(RunValue::Nothing)),
            ActionKind::SetClipboard => {
                let value = self.input(action);
                self.trace.events.push(Event::ClipboardWritten {
                    content: value.as_text(),
                });
                Ok(value)
            }
            ActionKind::GetDictionaryValue => {
                let key = self.text_param(action, action::DICTIONARY_KEY);
                let value = self
                    .input(action)
                    .as_object()
                    .and_then(|o| o.get(&key).map(RunValue::from_json))
                    .unwrap_or(RunValue::Nothing);
                Ok(value)
            }
            ActionKind::DownloadUrl => self.fetch(action),
            ActionKind::SaveToCameraRoll => match self.input(action) {
                RunValue::Media { source } => {
                    self.trace.events.push(Event::MediaSaved {
                        source: source.clone(),
                    });
                    Ok(RunValue::Media { source })
                }
                other => Err(ShortcutError::DryRun(format!(
                    "save to camera roll needs media, got {other:?}"
                ))),
            },
            ActionKind::Alert => {
                let title = self.text_param(action, action::ALERT_TITLE);
                let message = self.text_param(action, action::ALERT_MESSAGE);
                self.trace.events.push(Event::Alert { title, message });
                Ok(RunValue::Nothing)
            }
            ActionKind::Notification => {
                let title = self.text_param(action, action::NOTIFICATION_TITLE);
                let body = self.text_param(action, action::NOTIFICATION_BODY);
                self.trace.events.push(Event::Notification { title, body });
                Ok(RunValue::Nothing)
            }
            ActionKind::PreviewDocument => {
                let value = self.input(action);
                self.trace.events.push(Event::Preview {
                    content: value.as_text(),
                });
                Ok(value)
            }
            ActionKind::Conditional | ActionKind::RepeatEach => Err(ShortcutError::DryRun(
                format!("{} without a group", action.kind),
            )),
        }
    }

    fn fetch(&mut self, action: &Action) -> Result<RunValue> {
        let url = self.text_param(action, action::URL);
        let method = match action.param(action::HTTP_METHOD).and_then(Param::as_str) {
            Some(m) => m.to_string(),
            None => "GET".to_string(),
        };
        let headers: Vec<(String, String)> = self
            .mapping(action, action::HTTP_HEADERS)
            .map(|m| {
                m.pairs()
                    .iter()
                    .map(|(k, v)| (k.clone(), self.eval(v).as_text()))
                    .collect()
            })
            .unwrap_or_default();
        let json = self.mapping(action, action::JSON_VALUES).map(|m| {
            let body: serde_json::Map<String, serde_json::Value> = m
                .pairs()
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(self.eval(v).as_text())))
                .collect();
            serde_json::Value::Object(body)
        });

        let request = FetchRequest {
            url,
            method,
            headers,
            json,
        };
        if request.method == "GET" {
            self.trace.events.push(Event::MediaFetched {
                url: request.url.clone(),
            });
        } else {
            self.trace.events.push(Event::RequestSent {
                url: request.url.clone(),
                body: request.json.clone(),
            });
        }
        self.host.fetch(&request)
    }

    /// Execute a control-flow marker and return the next program counter.
    fn control(
        &mut self,
        action: &Action,
        group: Uuid,
        mode: ControlFlowMode,
        span: Span,
        pc: usize,
    ) -> Result<usize> {
        match (action.kind, mode) {
            (ActionKind::Conditional, ControlFlowMode::Begin) => {
                if self.holds(action)? {
                    Ok(pc + 1)
                } else {
                    Ok(span.otherwise.map_or(span.end, |e| e + 1))
                }
            }
            // Reached the else marker from the taken branch.
            (ActionKind::Conditional, ControlFlowMode::Else) => Ok(span.end + 1),
            (ActionKind::Conditional, ControlFlowMode::End) => Ok(pc + 1),
            (ActionKind::RepeatEach, ControlFlowMode::Begin) => {
                let items = match self.input(action) {
                    RunValue::Json(serde_json::Value::Array(items)) => {
                        items.iter().map(RunValue::from_json).collect()
                    }
                    RunValue::Nothing => Vec::new(),
                    other => vec![other],
                };
                if items.is_empty() {
                    return Ok(span.end + 1);
                }
                self.loops.push(Frame {
                    group,
                    items,
                    next: 0,
                });
                Ok(pc + 1)
            }
            (ActionKind::RepeatEach, ControlFlowMode::End) => {
                let Some(frame) = self.loops.last_mut().filter(|f| f.group == group) else {
                    return Err(ShortcutError::DryRun(format!(
                        "#{pc}: end of repeat without an active loop"
                    )));
                };
                frame.next += 1;
                if frame.next < frame.items.len() {
                    Ok(span.begin + 1)
                } else {
                    self.loops.pop();
                    Ok(pc + 1)
                }
            }
            (kind, mode) => Err(ShortcutError::DryRun(format!(
                "#{pc}: {kind} cannot carry mode {mode}"
            ))),
        }
    }

    fn holds(&self, action: &Action) -> Result<bool> {
        let code = match action.param(action::CONDITION) {
            Some(Param::Integer(code)) => *code,
            _ => {
                return Err(ShortcutError::DryRun(format!(
                    "{} begin has no condition",
                    action.kind
                )))
            }
        };
        let operand = action
            .param(action::CONDITION_STRING)
            .and_then(Param::as_str);
        let condition = Condition::from_code(code, operand)
            .ok_or_else(|| ShortcutError::DryRun(format!("unsupported condition code {code}")))?;
        let subject = self.input(action);
        Ok(match condition {
            Condition::Contains(needle) => subject.as_text().contains(&needle),
            Condition::HasAnyValue => !subject.is_empty(),
            Condition::DoesNotHaveAnyValue => subject.is_empty(),
        })
    }
}
