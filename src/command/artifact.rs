//! Generated artifacts: the `.desktop` entry and the launcher script.
//!
//! Both are rendered only from an [`ArtifactSpec`] and always overwrite the target.

use super::{
    config::{APP_NAME, ArtifactSpec},
    write_executable_atomically,
};
use anyhow::{Result, anyhow};
use std::{fmt::Write as _, path::Path};

pub fn write_desktop_entry(spec: &ArtifactSpec) -> Result<()> {
    let content = render_desktop_entry(spec)?;
    write_executable_atomically(&spec.desktop_entry, &content)?;
    tracing::debug!(path = %spec.desktop_entry.display(), "desktop entry written");
    Ok(())
}

pub fn write_launcher_script(spec: &ArtifactSpec) -> Result<()> {
    let content = render_launcher_script(spec)?;
    write_executable_atomically(&spec.launcher, &content)?;
    tracing::debug!(path = %spec.launcher.display(), "launcher written");
    Ok(())
}

pub fn render_desktop_entry(spec: &ArtifactSpec) -> Result<String> {
    let launcher = desktop_exec_arg(utf8(&spec.launcher)?);
    let icon = desktop_string(utf8(&spec.icon)?);

    let mut out = String::new();
    let _ = writeln!(out, "[Desktop Entry]");
    let _ = writeln!(out, "Type=Application");
    let _ = writeln!(out, "Name={APP_NAME}");
    let _ = writeln!(out, "GenericName=Code Editor");
    let _ = writeln!(out, "Comment=AI-first code editor");
    let _ = writeln!(out, "Exec={launcher} %F");
    let _ = writeln!(out, "Icon={icon}");
    let _ = writeln!(out, "Terminal=false");
    let _ = writeln!(out, "StartupNotify=true");
    let _ = writeln!(out, "StartupWMClass={APP_NAME}");
    let _ = writeln!(out, "Categories=Development;IDE;TextEditor;");
    let _ = writeln!(out, "MimeType=text/plain;inode/directory;");
    let _ = writeln!(out, "Actions=new-empty-window;");
    let _ = writeln!(out);
    let _ = writeln!(out, "[Desktop Action new-empty-window]");
    let _ = writeln!(out, "Name=New Empty Window");
    let _ = writeln!(out, "Exec={launcher} --new-window %F");
    let _ = writeln!(out, "Icon={icon}");
    Ok(out)
}

/// POSIX `sh` launcher. Paths are single-quoted; the sandbox flag is fixed at render time.
pub fn render_launcher_script(spec: &ArtifactSpec) -> Result<String> {
    let bundle = shell_quote(utf8(&spec.bundle)?);
    let log_file = shell_quote(utf8(&spec.log_file)?);
    let sandbox_arg = match spec.sandbox.launch_flag() {
        Some(flag) => format!(" {}", shell_quote(flag)),
        None => String::new(),
    };

    let mut out = String::new();
    let _ = writeln!(out, "#!/bin/sh");
    let _ = writeln!(
        out,
        "# Generated by cursor-installer; `cursor-installer --repair` rewrites this file."
    );
    let _ = writeln!(out, "BUNDLE={bundle}");
    let _ = writeln!(out, "LOG_FILE={log_file}");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        r#"if [ "$#" -eq 0 ] || {{ [ "$#" -eq 1 ] && [ "$1" = "." ]; }}; then"#
    );
    let _ = writeln!(out, r#"    set -- "$PWD""#);
    let _ = writeln!(out, "fi");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        r#"nohup "$BUNDLE"{sandbox_arg} "$@" </dev/null >>"$LOG_FILE" 2>&1 &"#
    );
    let _ = writeln!(out, "exit 0");
    Ok(out)
}

fn utf8(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow!("path is not valid UTF-8: {}", path.display()))
}

/// Single-quotes `value` for POSIX shells.
pub fn shell_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        if c == '\'' {
            out.push_str(r#"'\''"#);
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}

/// Escapes a value of type `string` in a desktop entry.
fn desktop_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str(r"\\"),
            '\n' => out.push_str(r"\n"),
            '\t' => out.push_str(r"\t"),
            '\r' => out.push_str(r"\r"),
            _ => out.push(c),
        }
    }
    out
}

/// Quotes one `Exec=` argument: Exec quoting first, then string escaping, then `%` doubling.
fn desktop_exec_arg(value: &str) -> String {
    const RESERVED: &[char] = &[
        ' ', '\t', '\n', '"', '\'', '\\', '>', '<', '~', '|', '&', ';', '$', '*', '?', '#', '(',
        ')', '`',
    ];
    let quoted = if value.contains(RESERVED) {
        let mut inner = String::with_capacity(value.len() + 2);
        inner.push('"');
        for c in value.chars() {
            if matches!(c, '"' | '`' | '$' | '\\') {
                inner.push('\\');
            }
            inner.push(c);
        }
        inner.push('"');
        inner
    } else {
        value.to_string()
    };
    desktop_string(&quoted).replace('%', "%%")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{
        config::{InstallerConfig, SandboxMode},
        is_executable_file,
        testing::{TempRoot, write_file},
    };
    use std::{fs, path::PathBuf};

    fn spec_at(home: &Path, sandbox: SandboxMode) -> ArtifactSpec {
        let config = InstallerConfig::with_home(home);
        config.artifact_spec(&home.join("Applications"), sandbox)
    }

    #[test]
    fn launcher_embeds_paths_and_no_sandbox_flag() {
        let spec = spec_at(Path::new("/home/dev"), SandboxMode::Disabled);
        let script = render_launcher_script(&spec).expect("render");
        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains("BUNDLE='/home/dev/Applications/cursor.AppImage'\n"));
        assert!(script.contains("LOG_FILE='/home/dev/.cursor_log'\n"));
        assert!(script.contains(r#"set -- "$PWD""#));
        assert!(script.contains(
            r#"nohup "$BUNDLE" '--no-sandbox' "$@" </dev/null >>"$LOG_FILE" 2>&1 &"#
        ));
    }

    #[test]
    fn launcher_without_flag_when_sandbox_enabled() {
        let spec = spec_at(Path::new("/home/dev"), SandboxMode::Enabled);
        let script = render_launcher_script(&spec).expect("render");
        assert!(!script.contains("--no-sandbox"));
        assert!(script.contains(r#"nohup "$BUNDLE" "$@""#));
    }

    #[test]
    fn launcher_quotes_hostile_paths() {
        let spec = spec_at(Path::new("/home/o'neil $(rm -rf ~)"), SandboxMode::Enabled);
        let script = render_launcher_script(&spec).expect("render");
        assert!(script.contains(
            r#"BUNDLE='/home/o'\''neil $(rm -rf ~)/Applications/cursor.AppImage'"#
        ));
    }

    #[test]
    fn rendering_is_deterministic() {
        let spec = spec_at(Path::new("/home/dev"), SandboxMode::Disabled);
        assert_eq!(
            render_launcher_script(&spec).expect("render"),
            render_launcher_script(&spec).expect("render")
        );
        assert_eq!(
            render_desktop_entry(&spec).expect("render"),
            render_desktop_entry(&spec).expect("render")
        );
    }

    #[test]
    fn desktop_entry_points_at_launcher_and_icon() {
        let spec = spec_at(Path::new("/home/dev"), SandboxMode::Disabled);
        let entry = render_desktop_entry(&spec).expect("render");
        assert!(entry.starts_with("[Desktop Entry]\n"));
        assert!(entry.contains("Exec=/home/dev/.local/bin/cursor %F\n"));
        assert!(entry.contains("Icon=/home/dev/.local/share/icons/cursor-icon.svg\n"));
        assert!(entry.contains("Name=Cursor\n"));
        assert!(entry.contains("StartupWMClass=Cursor\n"));
    }

    #[test]
    fn desktop_exec_quotes_reserved_characters() {
        assert_eq!(desktop_exec_arg("/usr/bin/cursor"), "/usr/bin/cursor");
        assert_eq!(
            desktop_exec_arg("/home/my user/bin/cursor"),
            r#""/home/my user/bin/cursor""#
        );
        assert_eq!(desktop_exec_arg("/a$b"), r#""/a\\$b""#);
        assert_eq!(desktop_exec_arg("/100%/cursor"), "/100%%/cursor");
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), r#"'it'\''s'"#);
    }

    #[test]
    fn writers_overwrite_and_mark_executable() {
        let root = TempRoot::new("artifact-write");
        let home = root.path().join("home");
        let spec = spec_at(&home, SandboxMode::Disabled);
        write_file(&spec.launcher, b"stale content", 0o644);

        write_launcher_script(&spec).expect("launcher");
        write_desktop_entry(&spec).expect("desktop entry");

        assert_eq!(
            fs::read_to_string(&spec.launcher).expect("read"),
            render_launcher_script(&spec).expect("render")
        );
        assert!(is_executable_file(&spec.launcher));
        assert!(is_executable_file(&spec.desktop_entry));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_paths_are_rejected() {
        use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

        let mut spec = spec_at(Path::new("/home/dev"), SandboxMode::Disabled);
        spec.bundle = PathBuf::from(OsStr::from_bytes(b"/home/\xff/cursor.AppImage"));
        assert!(render_launcher_script(&spec).is_err());
    }
}
