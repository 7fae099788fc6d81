//! Add the FIDO2 unlock directive to `/etc/crypttab`.
//!
//! Lines are edited in place: comments, blank lines and the original
//! field separators are preserved byte for byte, and the directive is
//! only ever added once, so re-running is a no-op.

use std::borrow::Cow;
use std::io::Read;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use cap_std_ext::cap_std::{ambient_authority, fs::Dir};
use cap_std_ext::dirext::CapStdExtDirExt;
use fn_error_context::context;
use luks_enroll_utils::{print_info, print_warning};

use crate::config::RunConfig;
use crate::error::ConfigError;

/// The option asking systemd-cryptsetup to unlock with any FIDO2 token.
pub(crate) const UNLOCK_DIRECTIVE: &str = "fido2-device=auto";
const UNLOCK_KEY: &str = "fido2-device";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineEdit {
    /// Comment or blank line.
    Passthrough,
    /// The entry already carries the directive.
    Present,
    /// The directive was appended to an existing options field.
    AppendedOption,
    /// The entry had no options field; one was added.
    AddedOptionsField,
    /// Not a valid entry; left alone.
    Malformed,
}

/// Summary of a crypttab update.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct CrypttabUpdate {
    /// Entries that gained the directive (or would, under dry-run).
    pub(crate) updated: Vec<String>,
    /// Entries that already had it.
    pub(crate) unchanged: Vec<String>,
    /// Lines that could not be interpreted.
    pub(crate) malformed: Vec<String>,
    /// Where the previous contents were saved, if the file was rewritten.
    pub(crate) backup: Option<Utf8PathBuf>,
}

/// Byte ranges of the whitespace separated fields of `line`.
fn field_spans(line: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in line.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, line.len()));
    }
    spans
}

/// Whether a comma separated options list already selects a FIDO2 device.
pub(crate) fn has_unlock_directive(options: &str) -> bool {
    options
        .split(',')
        .any(|opt| opt == UNLOCK_KEY || opt.starts_with("fido2-device="))
}

/// Edit a single line (without its newline).
pub(crate) fn edit_line(line: &str) -> (Cow<'_, str>, LineEdit) {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return (Cow::Borrowed(line), LineEdit::Passthrough);
    }
    let spans = field_spans(line);
    // New fields reuse the separator between the first two fields.
    let sep = match spans.as_slice() {
        [(_, end), (start, _), ..] if line[*end..*start].contains('\t') => "\t",
        _ => " ",
    };
    let insert_at = |at: usize, text: &str| -> Cow<'_, str> {
        Cow::Owned(format!("{}{text}{}", &line[..at], &line[at..]))
    };
    match spans.as_slice() {
        [] => (Cow::Borrowed(line), LineEdit::Passthrough),
        // A lone name cannot be unlocked; leave it for the operator to fix.
        [_] => (Cow::Borrowed(line), LineEdit::Malformed),
        // name and device only: the password field is implicit, spell it out
        // so the directive lands in the options column.
        [_, (_, end)] => (
            insert_at(*end, &format!("{sep}none{sep}{UNLOCK_DIRECTIVE}")),
            LineEdit::AddedOptionsField,
        ),
        [_, _, (_, end)] => (
            insert_at(*end, &format!("{sep}{UNLOCK_DIRECTIVE}")),
            LineEdit::AddedOptionsField,
        ),
        [_, _, _, (start, end), ..] => {
            if has_unlock_directive(&line[*start..*end]) {
                (Cow::Borrowed(line), LineEdit::Present)
            } else {
                (
                    insert_at(*end, &format!(",{UNLOCK_DIRECTIVE}")),
                    LineEdit::AppendedOption,
                )
            }
        }
    }
}

/// Rewrite a whole crypttab document, returning the new contents and what changed.
pub(crate) fn rewrite(contents: &str) -> (String, CrypttabUpdate) {
    let mut out = String::with_capacity(contents.len() + 64);
    let mut summary = CrypttabUpdate::default();
    for raw in contents.split_inclusive('\n') {
        let (line, eol) = match raw.strip_suffix('\n') {
            Some(line) => (line, "\n"),
            None => (raw, ""),
        };
        let (edited, edit) = edit_line(line);
        let name = line
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_owned();
        match edit {
            LineEdit::Passthrough => {}
            LineEdit::Present => summary.unchanged.push(name),
            LineEdit::AppendedOption | LineEdit::AddedOptionsField => summary.updated.push(name),
            LineEdit::Malformed => summary.malformed.push(line.to_owned()),
        }
        out.push_str(&edited);
        out.push_str(eol);
    }
    (out, summary)
}

/// Fail with [`ConfigError::Missing`] unless `path` exists.
pub(crate) fn ensure_present(path: &Utf8Path) -> Result<()> {
    if !path
        .try_exists()
        .with_context(|| ConfigError::Update(path.to_owned()))?
    {
        return Err(ConfigError::Missing(path.to_owned()).into());
    }
    Ok(())
}

/// Ensure every entry of the crypttab at `path` requests a FIDO2 token.
/// The previous contents are saved to `<path>.bak.<epoch seconds>` first;
/// under dry-run nothing is written and the intended changes are logged.
#[context("Updating {path}")]
pub(crate) fn add_unlock_option(path: &Utf8Path, cfg: &RunConfig) -> Result<CrypttabUpdate> {
    let update_err = || ConfigError::Update(path.to_owned());
    ensure_present(path)?;
    let parent = path
        .parent()
        .filter(|p| !p.as_str().is_empty())
        .unwrap_or(Utf8Path::new("."));
    let name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("{path} has no file name"))
        .with_context(update_err)?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority()).with_context(update_err)?;

    let Some(mut f) = dir.open_optional(name).with_context(update_err)? else {
        return Err(ConfigError::Missing(path.to_owned()).into());
    };
    let mut contents = String::new();
    f.read_to_string(&mut contents).with_context(update_err)?;
    let perms = f.metadata().with_context(update_err)?.permissions();
    drop(f);

    let (new_contents, mut summary) = rewrite(&contents);
    for line in &summary.malformed {
        print_warning(format_args!("Ignoring malformed line in {path}: {line:?}"));
    }
    if summary.updated.is_empty() {
        print_info(format_args!(
            "{path} already requests a FIDO2 token for every entry"
        ));
        return Ok(summary);
    }

    if cfg.dry_run {
        for entry in &summary.updated {
            print_info(format_args!(
                "dry-run: would add {UNLOCK_DIRECTIVE} to {entry} in {path}"
            ));
        }
        print_info(format_args!(
            "dry-run: would back up {path} to {path}.bak.<timestamp>"
        ));
        return Ok(summary);
    }

    let backup_name = format!("{name}.bak.{}", chrono::Utc::now().timestamp());
    dir.copy(name, &dir, &backup_name)
        .with_context(update_err)?;
    let backup = path.with_file_name(&backup_name);
    tracing::info!("Saved {path} to {backup}");

    dir.atomic_write_with_perms(name, new_contents.as_bytes(), perms)
        .with_context(update_err)?;
    tracing::info!(
        "Added {UNLOCK_DIRECTIVE} to {:?} in {path}",
        summary.updated
    );
    summary.backup = Some(backup);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use indoc::indoc;

    use super::*;

    const FIXTURE: &str = indoc! { "
        # /etc/crypttab: mappings for encrypted partitions.
        #
          # indented comment stays
        luks-2c5a3f0e UUID=2c5a3f0e-8a55-4f0c-9d1c-7d4b3e2f1a00 none discard

        data\t/dev/sdb1\t/etc/keys/data.key
        swap /dev/sdc2 /dev/urandom swap,cipher=aes-xts-plain64,fido2-device=auto
        home /dev/sdd1
    " };

    fn tempfile_with(contents: &str) -> Result<(tempfile::TempDir, Utf8PathBuf)> {
        let td = tempfile::tempdir()?;
        let path = Utf8Path::from_path(td.path()).unwrap().join("crypttab");
        std::fs::write(&path, contents)?;
        Ok((td, path))
    }

    fn backups(path: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
        let mut r = Vec::new();
        for e in path.parent().unwrap().read_dir_utf8()? {
            let e = e?;
            if e.file_name().starts_with("crypttab.bak.") {
                r.push(e.path().to_owned());
            }
        }
        Ok(r)
    }

    #[test]
    fn test_tab_separated_options() {
        let (line, edit) = edit_line("myroot\t/dev/sda3\tnone\tdiscard");
        assert_eq!(line, "myroot\t/dev/sda3\tnone\tdiscard,fido2-device=auto");
        assert_eq!(edit, LineEdit::AppendedOption);
    }

    #[test]
    fn test_missing_options_field() {
        let (line, edit) = edit_line("data /dev/sdb1 none");
        assert_eq!(line, "data /dev/sdb1 none fido2-device=auto");
        assert_eq!(edit, LineEdit::AddedOptionsField);

        let (line, _) = edit_line("data\t/dev/sdb1\tnone  ");
        assert_eq!(line, "data\t/dev/sdb1\tnone\tfido2-device=auto  ");

        let (line, edit) = edit_line("home /dev/sdd1");
        assert_eq!(line, "home /dev/sdd1 none fido2-device=auto");
        assert_eq!(edit, LineEdit::AddedOptionsField);
        let fields: Vec<_> = line.split_whitespace().collect();
        assert_eq!(fields[3], UNLOCK_DIRECTIVE);
    }

    #[test]
    fn test_directive_anywhere_is_unchanged() {
        for line in [
            "r /dev/sda3 none fido2-device=auto",
            "r /dev/sda3 none discard,fido2-device=auto",
            "r /dev/sda3 none fido2-device=auto,discard,tries=3",
            "r /dev/sda3 none discard,fido2-device=/dev/hidraw1",
            "r /dev/sda3 none discard,fido2-device",
        ] {
            let (edited, edit) = edit_line(line);
            assert_eq!(edited, line);
            assert_eq!(edit, LineEdit::Present, "{line}");
        }
        // Not anchored at a comma: a different option.
        assert!(!has_unlock_directive("discard,x-fido2-device=auto"));
    }

    #[test]
    fn test_comments_blank_and_malformed() {
        for line in ["", "   ", "# comment", "\t# comment fido2"] {
            let (edited, edit) = edit_line(line);
            assert_eq!(edited, line);
            assert_eq!(edit, LineEdit::Passthrough);
        }
        assert_eq!(edit_line("lonely").1, LineEdit::Malformed);
    }

    #[test]
    fn test_rewrite_document() {
        let (out, summary) = rewrite(FIXTURE);
        similar_asserts::assert_eq!(
            out,
            indoc! { "
                # /etc/crypttab: mappings for encrypted partitions.
                #
                  # indented comment stays
                luks-2c5a3f0e UUID=2c5a3f0e-8a55-4f0c-9d1c-7d4b3e2f1a00 none discard,fido2-device=auto

                data\t/dev/sdb1\t/etc/keys/data.key\tfido2-device=auto
                swap /dev/sdc2 /dev/urandom swap,cipher=aes-xts-plain64,fido2-device=auto
                home /dev/sdd1 none fido2-device=auto
            " }
        );
        assert_eq!(summary.updated, ["luks-2c5a3f0e", "data", "home"]);
        assert_eq!(summary.unchanged, ["swap"]);
        assert!(summary.malformed.is_empty());
    }

    #[test]
    fn test_rewrite_idempotent() {
        let (once, _) = rewrite(FIXTURE);
        let (twice, summary) = rewrite(&once);
        similar_asserts::assert_eq!(once, twice);
        assert!(summary.updated.is_empty());
        assert_eq!(summary.unchanged.len(), 4);
        assert_eq!(twice.matches(UNLOCK_DIRECTIVE).count(), 4);
    }

    #[test]
    fn test_rewrite_preserves_missing_final_newline() {
        let (out, _) = rewrite("a /dev/sda1 none luks");
        assert_eq!(out, "a /dev/sda1 none luks,fido2-device=auto");
        let (out, _) = rewrite("");
        assert_eq!(out, "");
    }

    #[test]
    fn test_add_unlock_option() -> Result<()> {
        let original = "myroot\t/dev/sda3\tnone\tdiscard\n";
        let (_td, path) = tempfile_with(original)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;

        let summary = add_unlock_option(&path, &RunConfig::default())?;
        assert_eq!(summary.updated, ["myroot"]);
        similar_asserts::assert_eq!(
            std::fs::read_to_string(&path)?,
            "myroot\t/dev/sda3\tnone\tdiscard,fido2-device=auto\n"
        );
        let mode = std::fs::metadata(&path)?.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);

        let backup = summary.backup.unwrap();
        assert_eq!(backups(&path)?, [backup.clone()]);
        assert_eq!(std::fs::read_to_string(&backup)?, original);

        // A second pass changes nothing and makes no further backup.
        let summary = add_unlock_option(&path, &RunConfig::default())?;
        assert!(summary.updated.is_empty());
        assert!(summary.backup.is_none());
        assert_eq!(backups(&path)?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_add_unlock_option_dry_run() -> Result<()> {
        let (_td, path) = tempfile_with(FIXTURE)?;
        let cfg = RunConfig {
            dry_run: true,
            auto_confirm: false,
        };
        let summary = add_unlock_option(&path, &cfg)?;
        assert_eq!(summary.updated.len(), 3);
        assert!(summary.backup.is_none());
        assert_eq!(std::fs::read_to_string(&path)?, FIXTURE);
        assert!(backups(&path)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_add_unlock_option_missing() -> Result<()> {
        let td = tempfile::tempdir()?;
        let path = Utf8Path::from_path(td.path()).unwrap().join("crypttab");
        let e = add_unlock_option(&path, &RunConfig::default()).unwrap_err();
        assert!(matches!(
            e.downcast_ref::<ConfigError>(),
            Some(ConfigError::Missing(_))
        ));
        Ok(())
    }
}
