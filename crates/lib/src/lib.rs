//! # LUKS FIDO2 enrollment
//!
//! Enrolls a FIDO2 security token on every LUKS volume of an rpm-ostree
//! based system, root volume first, then wires up boot-time unlock through
//! `/etc/crypttab` and initramfs regeneration.
//!
//! All cryptography and token handling is left to `cryptsetup` and
//! `systemd-cryptenroll`; this crate sequences them.

pub mod cli;
mod config;
mod cryptsetup;
mod crypttab;
mod enroll;
mod error;
mod initramfs;
mod pipeline;
mod preflight;
mod prompt;
mod scan;
mod system;
mod topology;

#[cfg(test)]
mod testutil;
