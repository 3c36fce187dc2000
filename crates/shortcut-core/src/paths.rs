use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// File name constants
// ---------------------------------------------------------------------------

pub const CONFIG_FILE: &str = "shortcut.yaml";
pub const SHORTCUT_EXT: &str = "shortcut";
pub const SIGNED_SUFFIX: &str = " (Signed)";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// `<dir>/<name>.shortcut`
pub fn unsigned_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.{SHORTCUT_EXT}"))
}

/// `<dir>/<name> (Signed).shortcut`
pub fn signed_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(signed_file_name(name))
}

pub fn signed_file_name(name: &str) -> String {
    format!("{name}{SIGNED_SUFFIX}.{SHORTCUT_EXT}")
}

/// Public download link for `file_name` under `base`. Spaces are the only
/// characters our file names need escaped.
pub fn install_url(base: &str, file_name: &str) -> String {
    let sep = if base.ends_with('/') { "" } else { "/" };
    format!("{base}{sep}{}", file_name.replace(' ', "%20"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_at_root() {
        let root = Path::new("/tmp/proj");
        assert_eq!(config_path(root), PathBuf::from("/tmp/proj/shortcut.yaml"));
    }

    #[test]
    fn document_paths() {
        let dir = Path::new("/out");
        assert_eq!(
            unsigned_path(dir, "Save Video"),
            PathBuf::from("/out/Save Video.shortcut")
        );
        assert_eq!(
            signed_path(dir, "Save Video Debug"),
            PathBuf::from("/out/Save Video Debug (Signed).shortcut")
        );
    }

    #[test]
    fn install_url_escapes_spaces() {
        let base = "https://github.com/chrisb4096-alt/cobalt-downloader/raw/master/";
        assert_eq!(
            install_url(base, &signed_file_name("Save Video")),
            "https://github.com/chrisb4096-alt/cobalt-downloader/raw/master/Save%20Video%20(Signed).shortcut"
        );
        assert_eq!(
            install_url("https://host/dir", "a b.shortcut"),
            "https://host/dir/a%20b.shortcut"
        );
    }
}
