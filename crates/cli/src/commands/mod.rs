pub mod audit;
pub mod config_cmd;
pub mod finalize;
pub mod list;
pub mod prepare;
pub mod remediate;
pub mod status;
pub mod sync_cmd;

use colored::*;

use sqlwarden_core::model::Stats;

/// One stats block, printed identically by every command that shows counts.
pub fn print_stats(stats: &Stats) {
    println!("{}", "Summary".bold());
    println!("  total findings          {}", stats.total_findings);
    println!(
        "  active issues           {}",
        if stats.active_issues > 0 {
            stats.active_issues.to_string().red().to_string()
        } else {
            stats.active_issues.to_string().green().to_string()
        }
    );
    println!("  documented exceptions   {}", stats.documented_exceptions);
    println!("  compliant               {}", stats.compliant);
    println!(
        "  since baseline          fixed {} / regressions {} / new {}",
        stats.fixed_since_baseline, stats.regressions_since_baseline, stats.new_issues_since_baseline
    );
    println!(
        "  since last sync         fixed {} / regressions {} / new {}",
        stats.fixed_since_last, stats.regressions_since_last, stats.new_issues_since_last
    );
    println!(
        "  instances               {} scanned, {} unreachable",
        stats.instances_scanned, stats.instances_unreachable
    );
}
