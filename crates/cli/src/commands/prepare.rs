use std::fmt::Write as _;

use colored::*;

use sqlwarden_core::{AuditConfig, Result};

/// Generate the PowerShell script that enables remote management on every
/// enabled target. Generation only; running it is up to the operator.
pub fn execute(config: &AuditConfig, output: &str) -> Result<()> {
    let targets = config.enabled_targets();
    let mut script = String::new();

    writeln!(script, "# Remote management preparation for {}", config.organization).ok();
    writeln!(script, "# Review before running with administrative rights.").ok();
    writeln!(script).ok();
    let server_list = targets
        .iter()
        .map(|t| format!("    '{}'", t.server))
        .collect::<Vec<_>>()
        .join(",\n");
    writeln!(script, "$servers = @(\n{}\n)", server_list).ok();
    writeln!(script).ok();
    writeln!(script, "foreach ($server in $servers) {{").ok();
    writeln!(script, "    Write-Host \"Preparing $server\"").ok();
    writeln!(
        script,
        "    Invoke-Command -ComputerName $server -ScriptBlock {{"
    )
    .ok();
    writeln!(script, "        Enable-PSRemoting -Force").ok();
    writeln!(
        script,
        "        Set-Service -Name WinRM -StartupType Automatic"
    )
    .ok();
    writeln!(script, "        Start-Service -Name WinRM").ok();
    writeln!(script, "    }}").ok();
    writeln!(script, "}}").ok();

    std::fs::write(output, script)?;
    println!(
        "wrote preparation script for {} target(s) to {}",
        targets.len(),
        output.bold()
    );
    Ok(())
}
