//! Version command

use crate::cli::VersionArgs;
use anyhow::Result;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct VersionInfo {
    name: &'static str,
    version: &'static str,
    target_os: &'static str,
    target_arch: &'static str,
}

impl VersionInfo {
    fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            target_os: std::env::consts::OS,
            target_arch: std::env::consts::ARCH,
        }
    }

    fn display(&self) -> String {
        format!(
            "{} {} ({}-{})",
            self.name, self.version, self.target_os, self.target_arch
        )
    }
}

pub fn run(args: VersionArgs) -> Result<()> {
    let info = VersionInfo::current();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("{}", info.display());
    }

    Ok(())
}
