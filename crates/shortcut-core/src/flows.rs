//! The two document flows: the main "Save Video" shortcut and its debug
//! variant. Both are assembled from the same handful of stages on top of
//! [`FlowBuilder`].

use crate::action::Condition;
use crate::builder::{DataFlow, FlowBuilder, IdSource, Input};
use crate::document::{Document, DocumentMetadata, DEFAULT_COLOR};
use crate::error::Result;
use crate::value::{keyed_mapping, literal, with_coercion, ContentType};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const VIDEO_URL: &str = "videoURL";
pub const API_RESPONSE: &str = "apiResponse";
pub const STATUS: &str = "status";
pub const ERROR_MSG: &str = "errorMsg";
pub const DOWNLOAD_URL: &str = "downloadURL";

pub const NOTIFY_TITLE: &str = "Save Video";
pub const DEBUG_NOTIFY_TITLE: &str = "Save Video (Debug)";
pub const ALERT_TITLE: &str = "Download Failed";
pub const SAVED_BODY: &str = "Video saved!";
pub const ALL_SAVED_BODY: &str = "All items saved!";
pub const DEBUG_SAVED_BODY: &str = "Video saved! Response copied to clipboard.";

/// Substring of the share URL that selects the uncoerced download path.
pub const FACEBOOK_MARKER: &str = "facebook";

pub const DEBUG_COLOR: i64 = 4282601983;

/// What a flow needs to know about the extraction endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowSettings {
    pub api_url: String,
    pub api_key: String,
    pub data_flow: DataFlow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Main,
    Debug,
}

impl Variant {
    pub fn all() -> [Variant; 2] {
        [Variant::Main, Variant::Debug]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Variant::Main => "main",
            Variant::Debug => "debug",
        }
    }

    pub fn default_name(self) -> &'static str {
        match self {
            Variant::Main => "Save Video",
            Variant::Debug => "Save Video Debug",
        }
    }

    pub fn default_color(self) -> i64 {
        match self {
            Variant::Main => DEFAULT_COLOR,
            Variant::Debug => DEBUG_COLOR,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// `videoURL` from the share sheet, falling back to the clipboard.
fn resolve_input<I: IdSource>(b: &mut FlowBuilder<I>) -> Result<()> {
    b.set_variable(VIDEO_URL, Input::ShortcutInput)?;
    b.begin_if(Input::var(VIDEO_URL), Condition::DoesNotHaveAnyValue)?;
    b.get_clipboard();
    b.set_variable(VIDEO_URL, Input::Previous)?;
    b.end_if()
}

fn submit_request<I: IdSource>(b: &mut FlowBuilder<I>, settings: &FlowSettings) -> Result<()> {
    let headers = keyed_mapping([
        ("Accept", literal("application/json")),
        ("Content-Type", literal("application/json")),
        ("Authorization", literal(format!("Api-Key {}", settings.api_key))),
    ]);
    let body = keyed_mapping([
        ("url", b.text_var(VIDEO_URL)?),
        ("videoQuality", literal("max")),
        ("filenameStyle", literal("pretty")),
        ("youtubeVideoCodec", literal("h264")),
    ]);
    b.post_json(literal(settings.api_url.as_str()), headers, body);
    b.set_variable(API_RESPONSE, Input::Previous)?;
    Ok(())
}

fn extract_status<I: IdSource>(b: &mut FlowBuilder<I>) -> Result<()> {
    b.get_dictionary_value("status", Input::var(API_RESPONSE))?;
    b.set_variable(STATUS, Input::Previous)?;
    Ok(())
}

/// Fetch `downloadURL` and save what comes back to the media library.
fn download_and_save<I: IdSource>(b: &mut FlowBuilder<I>) -> Result<()> {
    let url = b.text_var(DOWNLOAD_URL)?;
    b.download(url);
    b.save_to_camera_roll(Input::Previous)?;
    Ok(())
}

/// Download the single `url` of the response. Facebook links keep the raw
/// value; everything else is coerced to a URL first.
fn single_redirect_download<I: IdSource>(b: &mut FlowBuilder<I>) -> Result<()> {
    let url = b.get_dictionary_value("url", Input::var(API_RESPONSE))?;
    b.begin_if(
        Input::var(VIDEO_URL),
        Condition::Contains(FACEBOOK_MARKER.into()),
    )?;
    b.set_variable(DOWNLOAD_URL, Input::Step(url))?;
    b.otherwise()?;
    let coerced = with_coercion(b.output_ref(url)?, ContentType::Url)?;
    b.set_variable(DOWNLOAD_URL, Input::Value(coerced))?;
    b.end_if()?;
    download_and_save(b)
}

fn picker_download<I: IdSource>(b: &mut FlowBuilder<I>) -> Result<()> {
    let items = b.get_dictionary_value("picker", Input::var(API_RESPONSE))?;
    b.begin_repeat_each(Input::Step(items))?;
    let url = b.get_dictionary_value("url", Input::RepeatItem)?;
    let item_url = with_coercion(b.output_ref(url)?, ContentType::Url)?;
    b.set_variable(DOWNLOAD_URL, Input::Value(item_url))?;
    download_and_save(b)?;
    b.end_repeat()?;
    b.notify(NOTIFY_TITLE, ALL_SAVED_BODY);
    Ok(())
}

fn build_main<I: IdSource>(b: &mut FlowBuilder<I>, settings: &FlowSettings) -> Result<()> {
    resolve_input(b)?;
    submit_request(b, settings)?;
    extract_status(b)?;

    b.begin_if(Input::var(STATUS), Condition::Contains("error".into()))?;
    b.get_dictionary_value("error", Input::var(API_RESPONSE))?;
    b.set_variable(ERROR_MSG, Input::Previous)?;
    let message = b.text_var(ERROR_MSG)?;
    b.alert(ALERT_TITLE, message, false);
    b.otherwise()?;

    b.begin_if(Input::var(STATUS), Condition::Contains("picker".into()))?;
    picker_download(b)?;
    b.otherwise()?;
    single_redirect_download(b)?;
    b.notify(NOTIFY_TITLE, SAVED_BODY);
    b.end_if()?;

    b.end_if()
}

fn build_debug<I: IdSource>(b: &mut FlowBuilder<I>, settings: &FlowSettings) -> Result<()> {
    resolve_input(b)?;
    submit_request(b, settings)?;
    extract_status(b)?;
    b.preview(Input::var(API_RESPONSE))?;
    b.set_clipboard(Input::var(API_RESPONSE))?;
    single_redirect_download(b)?;
    b.notify(DEBUG_NOTIFY_TITLE, DEBUG_SAVED_BODY);
    Ok(())
}

/// Assemble, validate and wrap one flow.
pub fn build<I: IdSource>(
    variant: Variant,
    settings: &FlowSettings,
    metadata: DocumentMetadata,
    ids: I,
) -> Result<Document> {
    let mut b = FlowBuilder::new(ids, settings.data_flow);
    match variant {
        Variant::Main => build_main(&mut b, settings)?,
        Variant::Debug => build_debug(&mut b, settings)?,
    }
    Ok(Document::new(b.finish()?, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, ActionKind, ControlFlowMode};
    use crate::builder::SequentialIds;
    use crate::value::{Reference, TypedValue};

    fn settings() -> FlowSettings {
        FlowSettings {
            api_url: "https://api.example/".into(),
            api_key: "k-123".into(),
            data_flow: DataFlow::Explicit,
        }
    }

    fn main_doc() -> Document {
        build(
            Variant::Main,
            &settings(),
            DocumentMetadata::default(),
            SequentialIds::default(),
        )
        .unwrap()
    }

    fn kinds(doc: &Document) -> Vec<ActionKind> {
        doc.actions.iter().map(|a| a.kind).collect()
    }

    #[test]
    fn main_flow_opens_with_input_fallback() {
        let doc = main_doc();
        assert_eq!(
            &kinds(&doc)[..5],
            &[
                ActionKind::SetVariable,
                ActionKind::Conditional,
                ActionKind::GetClipboard,
                ActionKind::SetVariable,
                ActionKind::Conditional,
            ]
        );
        assert_eq!(doc.actions[0].references(), vec![&Reference::ShortcutInput]);
    }

    #[test]
    fn request_carries_api_key_header() {
        let doc = main_doc();
        let post = doc
            .actions
            .iter()
            .find(|a| a.kind == ActionKind::DownloadUrl)
            .unwrap();
        let plist = post.to_plist();
        let mut buf = Vec::new();
        plist::to_writer_xml(&mut buf, &plist).unwrap();
        let xml = String::from_utf8(buf).unwrap();
        assert!(xml.contains("Api-Key k-123"));
        assert!(xml.contains("youtubeVideoCodec"));
        assert!(xml.contains("<string>POST</string>"));
    }

    #[test]
    fn branches_nest_error_outermost() {
        let doc = main_doc();
        let conditions: Vec<&Action> = doc
            .actions
            .iter()
            .filter(|a| {
                a.kind == ActionKind::Conditional
                    && a.control.map(|c| c.mode) == Some(ControlFlowMode::Begin)
            })
            .collect();
        let operands: Vec<Option<&str>> = conditions
            .iter()
            .map(|a| {
                a.param(crate::action::CONDITION_STRING)
                    .and_then(|p| p.as_str())
            })
            .collect();
        assert_eq!(
            operands,
            vec![None, Some("error"), Some("picker"), Some(FACEBOOK_MARKER)]
        );
    }

    #[test]
    fn facebook_path_is_uncoerced() {
        let doc = main_doc();
        let writes: Vec<&Action> = doc
            .actions
            .iter()
            .filter(|a| a.writes_variable() == Some(DOWNLOAD_URL))
            .collect();
        // picker item, facebook, everything else
        assert_eq!(writes.len(), 3);
        let coercion = |a: &Action| match a.param(crate::action::INPUT) {
            Some(crate::action::Param::Value(v)) => v.coercion(),
            _ => None,
        };
        assert_eq!(coercion(writes[0]), Some(ContentType::Url));
        assert_eq!(coercion(writes[1]), None);
        assert_eq!(coercion(writes[2]), Some(ContentType::Url));
    }

    #[test]
    fn debug_flow_previews_and_copies_response() {
        let doc = build(
            Variant::Debug,
            &settings(),
            DocumentMetadata::default(),
            SequentialIds::default(),
        )
        .unwrap();
        let k = kinds(&doc);
        assert!(k.contains(&ActionKind::PreviewDocument));
        assert!(k.contains(&ActionKind::SetClipboard));
        assert!(!k.contains(&ActionKind::Alert));
        assert!(!k.contains(&ActionKind::RepeatEach));
        let preview = doc
            .actions
            .iter()
            .find(|a| a.kind == ActionKind::PreviewDocument)
            .unwrap();
        assert_eq!(
            preview.param(crate::action::INPUT),
            Some(&crate::action::Param::Value(TypedValue::Direct {
                reference: Reference::Variable(API_RESPONSE.into()),
                coercion: None,
            }))
        );
    }

    #[test]
    fn implicit_mode_still_builds() {
        let mut s = settings();
        s.data_flow = DataFlow::Implicit;
        for variant in Variant::all() {
            build(variant, &s, DocumentMetadata::default(), SequentialIds::default()).unwrap();
        }
    }

    #[test]
    fn variant_defaults() {
        assert_eq!(Variant::Main.default_name(), "Save Video");
        assert_eq!(Variant::Debug.default_name(), "Save Video Debug");
        assert_eq!(Variant::Debug.default_color(), 4282601983);
        assert_eq!(Variant::Main.to_string(), "main");
    }
}
