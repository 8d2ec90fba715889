//! Client-side token acquisition. The hub verifies tokens against GitHub,
//! and the `gh` CLI already holds one; shelling out keeps crewboard out of
//! the OAuth business.

use anyhow::{bail, Context, Result};
use std::process::Command;

pub fn get_token() -> Result<String> {
    let output = Command::new("gh")
        .args(["auth", "token"])
        .output()
        .context("run `gh auth login` to authenticate")?;
    if !output.status.success() {
        bail!("gh auth token failed; run `gh auth login` to authenticate");
    }
    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        bail!("gh returned an empty token; run `gh auth login`");
    }
    Ok(token)
}
