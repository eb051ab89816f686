//! `opwatch presets`

use std::io::{self, Write};

use opwatch_deploy::Preset;
use opwatch_poll::Bucket;

pub fn run(out: &mut impl Write) -> io::Result<()> {
    for (i, preset) in Preset::ALL.into_iter().enumerate() {
        if i > 0 {
            writeln!(out)?;
        }
        write_preset(out, preset)?;
    }
    Ok(())
}

fn write_preset(out: &mut impl Write, preset: Preset) -> io::Result<()> {
    let config = preset.config();
    let classifier = preset.classifier();

    writeln!(out, "{preset} ({})", classifier.resource())?;
    writeln!(
        out,
        "  interval:      {}",
        humantime::format_duration(config.interval())
    )?;
    if config.has_explicit_max_attempts() {
        writeln!(out, "  max attempts:  {}", config.max_attempts())?;
    } else {
        writeln!(
            out,
            "  timeout:       {}",
            humantime::format_duration(config.total_timeout())
        )?;
    }
    writeln!(out, "  state pointer: {}", preset.state_pointer())?;

    for bucket in [Bucket::InProgress, Bucket::Succeeded, Bucket::Failed] {
        let mut states: Vec<&str> = classifier.states_in(bucket).map(String::as_str).collect();
        states.sort_unstable();
        writeln!(out, "  {:<14} {}", format!("{bucket}:"), states.join(", "))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn infra_manager_block() {
        let mut out = Vec::new();
        write_preset(&mut out, Preset::InfraManager).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "infra-manager (deployment)\n\
             \x20 interval:      30s\n\
             \x20 timeout:       30m\n\
             \x20 state pointer: /state\n\
             \x20 in-progress:   CREATING, UPDATING\n\
             \x20 succeeded:     ACTIVE\n\
             \x20 failed:        DELETED, DELETING, FAILED, SUSPENDED\n"
        );
    }

    #[test]
    fn argo_shows_attempt_bound() {
        let mut out = Vec::new();
        write_preset(&mut out, Preset::ArgoSync).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("max attempts:  30"), "{text}");
        assert!(!text.contains("timeout:"), "{text}");
    }
}
