//! Operator confirmation before anything is changed.

use anyhow::{Context, Result};
use indoc::indoc;
use owo_colors::OwoColorize;

use crate::error::PreflightError;

const BANNER: &str = indoc! { "
    This will enroll a FIDO2 security token on every LUKS volume of this
    system, starting with the one holding the root filesystem, and then
    configure the boot process to unlock them with the token.

    * Keep the token plugged in; you will be asked for each volume's
      existing passphrase, the token PIN, and to touch the token.
    * Existing passphrases are kept. Do not lose them: they remain the
      recovery path if the token is lost.
    * /etc/crypttab is rewritten (a timestamped backup is kept) and
      initramfs regeneration is enabled; reboot afterwards.
" };

pub(crate) fn print_banner() {
    println!("{}", "WARNING".bold().yellow());
    println!("{BANNER}");
}

/// Ask for a yes/no confirmation, defaulting to no. A refusal, or no
/// terminal to ask on, aborts the run.
pub(crate) fn confirm() -> Result<()> {
    let confirmed = dialoguer::Confirm::new()
        .with_prompt("Continue?")
        .default(false)
        .wait_for_newline(true)
        .interact()
        .context(PreflightError::NoConfirmation)?;
    if !confirmed {
        return Err(PreflightError::Declined.into());
    }
    Ok(())
}
