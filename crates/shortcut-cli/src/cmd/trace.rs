use crate::output::print_json;
use anyhow::Context;
use shortcut_core::builder::SequentialIds;
use shortcut_core::config::GeneratorConfig;
use shortcut_core::dry_run::{self, Event, ScriptedHost};
use shortcut_core::flows::{self, FlowSettings, Variant};
use std::path::Path;

/// Stand-in when no key is configured; the tracer never sends it anywhere.
const PLACEHOLDER_KEY: &str = "dry-run";

pub struct TraceArgs<'a> {
    pub response: &'a str,
    pub input: Option<&'a str>,
    pub clipboard: Option<&'a str>,
    pub debug: bool,
}

fn load_response(arg: &str) -> anyhow::Result<serde_json::Value> {
    let text = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("cannot read response file {path}"))?,
        None => arg.to_string(),
    };
    serde_json::from_str(&text).context("response is not valid JSON")
}

pub fn run(root: &Path, args: TraceArgs<'_>, json: bool) -> anyhow::Result<()> {
    let cfg = GeneratorConfig::load(root).context("failed to load shortcut.yaml")?;
    let response = load_response(args.response)?;
    let variant = if args.debug {
        Variant::Debug
    } else {
        Variant::Main
    };

    let settings = FlowSettings {
        api_url: cfg.api_url.clone(),
        api_key: cfg
            .api_key()
            .unwrap_or_else(|_| PLACEHOLDER_KEY.to_string()),
        data_flow: cfg.data_flow,
    };
    let doc = flows::build(
        variant,
        &settings,
        cfg.metadata(variant),
        SequentialIds::default(),
    )
    .with_context(|| format!("failed to build the {variant} flow"))?;

    let mut host = ScriptedHost::new(cfg.api_url.as_str(), response);
    host.input = args.input.map(str::to_string);
    host.clipboard = args.clipboard.map(str::to_string);
    let trace = dry_run::run(&doc, &mut host).context("dry run failed")?;

    if json {
        return print_json(&trace);
    }

    println!("{variant} flow, {} steps", trace.steps);
    for event in &trace.events {
        match event {
            Event::RequestSent { url, body } => {
                let body = body.as_ref().map(|b| b.to_string()).unwrap_or_default();
                println!("  request   POST {url} {body}");
            }
            Event::MediaFetched { url } => println!("  fetch     {url}"),
            Event::MediaSaved { source } => println!("  save      {source}"),
            Event::Alert { title, message } => println!("  alert     {title}: {message}"),
            Event::Notification { title, body } => println!("  notify    {title}: {body}"),
            Event::Preview { content } => println!("  preview   {content}"),
            Event::ClipboardWritten { content } => println!("  clipboard {content}"),
        }
    }
    println!();
    for (name, value) in &trace.variables {
        println!("  {name} = {}", value.as_text());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn inline_response_is_parsed() {
        let v = load_response(r#"{"status":"tunnel"}"#).unwrap();
        assert_eq!(v["status"], "tunnel");
    }

    #[test]
    fn at_prefix_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resp.json");
        std::fs::write(&path, r#"{"status":"error","error":"nope"}"#).unwrap();
        let v = load_response(&format!("@{}", path.display())).unwrap();
        assert_eq!(v["error"], "nope");
    }

    #[test]
    fn bad_json_is_an_error() {
        assert!(load_response("not json").is_err());
    }
}
