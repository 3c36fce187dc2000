use crate::output::print_json;
use crate::sign::Signer;
use anyhow::{bail, Context};
use serde::Serialize;
use shortcut_core::builder::RandomIds;
use shortcut_core::config::{self, GeneratorConfig, WarnLevel};
use shortcut_core::flows::{self, Variant};
use shortcut_core::{io, paths, ShortcutError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Serialize)]
struct SignedFile {
    path: PathBuf,
    bytes: u64,
    install_url: Option<String>,
}

#[derive(Serialize)]
struct GeneratedFile {
    variant: Variant,
    name: String,
    path: PathBuf,
    bytes: u64,
    actions: usize,
    signed: Option<SignedFile>,
    sign_error: Option<String>,
}

pub fn run(root: &Path, no_sign: bool, json: bool) -> anyhow::Result<()> {
    let cfg = GeneratorConfig::load(root).context("failed to load shortcut.yaml")?;
    let warnings = cfg.validate();
    for w in &warnings {
        warn!("config: {}", w.message);
    }
    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        bail!("shortcut.yaml has errors; fix them before generating");
    }

    let settings = match cfg.settings() {
        Ok(settings) => settings,
        Err(e @ ShortcutError::MissingApiKey) => {
            eprintln!(
                "hint: export {}=<key>, or add `api_key: <key>` to {}",
                config::API_KEY_ENV,
                paths::config_path(root).display()
            );
            return Err(e).context("cannot configure the extraction request");
        }
        Err(e) => return Err(e).context("cannot configure the extraction request"),
    };
    let out_dir = cfg.output_dir(root);
    io::ensure_dir(&out_dir)
        .with_context(|| format!("cannot create output directory {}", out_dir.display()))?;

    let signer = if no_sign {
        None
    } else {
        Some(Signer::new(
            cfg.signing_url.as_str(),
            Duration::from_secs(cfg.sign_timeout_secs),
        ))
    };

    let mut generated = Vec::new();
    for variant in Variant::all() {
        let name = &cfg.variant(variant).name;
        let doc = flows::build(variant, &settings, cfg.metadata(variant), RandomIds)
            .with_context(|| format!("failed to build the {variant} flow"))?;
        let data = doc.to_binary().context("failed to encode document")?;
        let path = paths::unsigned_path(&out_dir, name);
        io::atomic_write(&path, &data)
            .with_context(|| format!("failed to write {}", path.display()))?;
        let bytes = io::file_size(&path)
            .with_context(|| format!("cannot stat {}", path.display()))?;
        info!(%variant, actions = doc.actions.len(), bytes, "generated {}", path.display());

        let mut file = GeneratedFile {
            variant,
            name: name.clone(),
            path,
            bytes,
            actions: doc.actions.len(),
            signed: None,
            sign_error: None,
        };

        if let Some(signer) = &signer {
            let file_name = format!("{name}.{}", paths::SHORTCUT_EXT);
            let signed_path = paths::signed_path(&out_dir, name);
            match signer.sign(&file_name, &data) {
                Ok(signed) => {
                    io::atomic_write(&signed_path, &signed)
                        .with_context(|| format!("failed to write {}", signed_path.display()))?;
                    let bytes = io::file_size(&signed_path)
                        .with_context(|| format!("cannot stat {}", signed_path.display()))?;
                    info!(%variant, bytes, "signed {}", signed_path.display());
                    file.signed = Some(SignedFile {
                        path: signed_path,
                        bytes,
                        install_url: cfg
                            .install_base_url
                            .as_deref()
                            .map(|base| paths::install_url(base, &paths::signed_file_name(name))),
                    });
                }
                Err(e) => {
                    warn!(%variant, url = signer.url(), "signing failed: {e}");
                    // A signed copy from an earlier run no longer matches the new document.
                    if io::remove_if_exists(&signed_path).with_context(|| {
                        format!("cannot remove stale {}", signed_path.display())
                    })? {
                        warn!(%variant, "removed stale {}", signed_path.display());
                    }
                    file.sign_error = Some(e.to_string());
                }
            }
        }
        generated.push(file);
    }

    if json {
        return print_json(&generated);
    }

    for file in &generated {
        let file_name = file
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        println!("Generated: {file_name} ({} bytes)", file.bytes);
        match (&file.signed, &file.sign_error) {
            (Some(s), _) => println!("  Signed: {} ({} bytes)", s.path.display(), s.bytes),
            (None, Some(e)) => println!("  Signing failed: {e}"),
            (None, None) => println!("  Signing skipped"),
        }
    }

    let links: Vec<(Variant, &str)> = generated
        .iter()
        .filter_map(|f| {
            f.signed
                .as_ref()
                .and_then(|s| s.install_url.as_deref())
                .map(|u| (f.variant, u))
        })
        .collect();
    if !links.is_empty() {
        println!();
        println!("Install on iPhone (open in Safari):");
        for (variant, url) in links {
            let label = match variant {
                Variant::Main => "Main: ",
                Variant::Debug => "Debug:",
            };
            println!("  {label} {url}");
        }
    }
    Ok(())
}
