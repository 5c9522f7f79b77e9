#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use spi_regs::{
    BusTiming, Frame, FrameOutcome, IoSnapshot, PinSample, Register, SpiRegPeripheral, Waveform,
};

#[derive(Debug, Parser)]
#[command(about = "Drive the serial register peripheral model from a JSON stimulus script")]
pub struct Args {
    /// JSON array of stimulus operations.
    #[arg(long)]
    script: PathBuf,

    /// Local clock ticks per serial clock phase.
    #[arg(long)]
    half_period_ticks: Option<u32>,

    /// Ticks between chip-select assertion and the first clock phase.
    #[arg(long)]
    lead_ticks: Option<u32>,

    /// Idle ticks after each frame.
    #[arg(long)]
    trail_ticks: Option<u32>,

    /// Restore device state before running the script.
    #[arg(long)]
    snapshot_load: Option<PathBuf>,

    /// Save device state after the script completes.
    #[arg(long)]
    snapshot_save: Option<PathBuf>,

    /// Print registers as a JSON object instead of `name = value` lines.
    #[arg(long)]
    json: bool,
}

impl Args {
    fn timing(&self) -> BusTiming {
        let defaults = BusTiming::default();
        BusTiming {
            half_period_ticks: self.half_period_ticks.unwrap_or(defaults.half_period_ticks),
            lead_ticks: self.lead_ticks.unwrap_or(defaults.lead_ticks),
            trail_ticks: self.trail_ticks.unwrap_or(defaults.trail_ticks),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
enum Op {
    /// Hold reset asserted for `ticks`, release it, then idle the bus for
    /// [`RESET_SETTLE_TICKS`].
    Reset { ticks: u32 },
    /// Bus at rest.
    Idle { ticks: u32 },
    /// Write frame (write-enable set).
    Write { address: u8, data: u8 },
    /// Frame with explicit write-enable.
    Frame {
        write_enable: bool,
        address: u8,
        data: u8,
    },
    /// One chip-select window with arbitrary bits (0/1), first bit first.
    Bits { bits: Vec<u8> },
    /// Raw packed `ui_in` values, one per tick.
    UiIn { values: Vec<u8> },
}

/// Idle ticks stepped after a reset release. The synchronizer comes out of reset reading nCS as
/// asserted, so it has to see the bus at rest before the next frame can start.
const RESET_SETTLE_TICKS: u32 = 5;

fn parse_script(text: &str) -> Result<Vec<Op>> {
    serde_json::from_str(text).context("invalid stimulus script")
}

fn to_bits(bits: &[u8]) -> Result<Vec<bool>> {
    bits.iter()
        .map(|&b| match b {
            0 => Ok(false),
            1 => Ok(true),
            other => bail!("bit values must be 0 or 1, got {other}"),
        })
        .collect()
}

fn log_outcomes(outcomes: &[FrameOutcome]) {
    for outcome in outcomes {
        match outcome {
            FrameOutcome::Committed { register, value } => {
                tracing::info!("{register} <- {value:#04x}");
            }
            FrameOutcome::Rejected(reason) => {
                tracing::info!("frame rejected: {reason:?}");
            }
        }
    }
}

fn execute(dev: &mut SpiRegPeripheral, ops: &[Op], timing: BusTiming) -> Result<Vec<FrameOutcome>> {
    let mut outcomes = Vec::new();

    for (index, op) in ops.iter().enumerate() {
        let mut wave = Waveform::new(timing)?;
        match op {
            Op::Reset { ticks } => {
                dev.set_reset_n(false);
                for _ in 0..*ticks {
                    dev.step(PinSample::IDLE);
                }
                dev.set_reset_n(true);
                wave.idle(RESET_SETTLE_TICKS);
            }
            Op::Idle { ticks } => {
                wave.idle(*ticks);
            }
            Op::Write { address, data } => {
                let frame = Frame::write(*address, *data)
                    .with_context(|| format!("op {index}: bad write"))?;
                wave.frame(&frame);
            }
            Op::Frame {
                write_enable,
                address,
                data,
            } => {
                let frame = Frame::new(*write_enable, *address, *data)
                    .with_context(|| format!("op {index}: bad frame"))?;
                wave.frame(&frame);
            }
            Op::Bits { bits } => {
                let bits = to_bits(bits).with_context(|| format!("op {index}: bad bits"))?;
                wave.bits(&bits);
            }
            Op::UiIn { values } => {
                wave.extend(values.iter().map(|&v| PinSample::from_ui_in(v)));
            }
        }

        let produced = dev.run(&wave);
        log_outcomes(&produced);
        outcomes.extend(produced);
    }

    Ok(outcomes)
}

fn render(dev: &SpiRegPeripheral, json: bool) -> Result<String> {
    if json {
        return serde_json::to_string_pretty(dev.registers()).context("failed to encode registers");
    }
    let lines: Vec<String> = Register::ALL
        .iter()
        .map(|&reg| format!("{} = {:#04x}", reg.name(), dev.registers().get(reg)))
        .collect();
    Ok(lines.join("\n"))
}

fn load_snapshot(dev: &mut SpiRegPeripheral, path: &Path) -> Result<()> {
    let bytes = fs::read(path)
        .with_context(|| format!("failed to read snapshot: {}", path.display()))?;
    dev.load_state(&bytes)
        .with_context(|| format!("failed to restore snapshot: {}", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let timing = args.timing();
    timing.validate().context("invalid bus timing")?;

    let text = fs::read_to_string(&args.script)
        .with_context(|| format!("failed to read script: {}", args.script.display()))?;
    let ops = parse_script(&text)?;

    let mut dev = SpiRegPeripheral::new();
    if let Some(path) = &args.snapshot_load {
        load_snapshot(&mut dev, path)?;
        tracing::info!("restored snapshot from {}", path.display());
    }

    let outcomes = execute(&mut dev, &ops, timing)?;
    let committed = outcomes.iter().filter(|o| o.is_committed()).count();
    tracing::info!(
        ops = ops.len(),
        frames = outcomes.len(),
        committed,
        ticks = dev.tick_count(),
        "script complete"
    );

    if let Some(path) = &args.snapshot_save {
        fs::write(path, dev.save_state())
            .with_context(|| format!("failed to write snapshot: {}", path.display()))?;
    }

    println!("{}", render(&dev, args.json)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> BusTiming {
        BusTiming {
            half_period_ticks: 2,
            lead_ticks: 1,
            trail_ticks: 4,
        }
    }

    #[test]
    fn script_ops_parse() {
        let ops = parse_script(
            r#"[
                {"op": "reset", "ticks": 5},
                {"op": "idle", "ticks": 10},
                {"op": "write", "address": 0, "data": 240},
                {"op": "frame", "write_enable": false, "address": 1, "data": 1},
                {"op": "bits", "bits": [1, 0, 1]},
                {"op": "ui_in", "values": [4, 4]}
            ]"#,
        )
        .unwrap();
        assert_eq!(ops.len(), 6);
        assert_eq!(ops[2], Op::Write { address: 0, data: 240 });
        assert_eq!(ops[5], Op::UiIn { values: vec![4, 4] });
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(parse_script(r#"[{"op": "idle", "ticks": 1, "extra": 2}]"#).is_err());
        assert!(parse_script(r#"[{"op": "teleport"}]"#).is_err());
    }

    #[test]
    fn execute_reports_outcomes_and_updates_registers() {
        let ops = vec![
            Op::Reset { ticks: 3 },
            Op::Idle { ticks: 4 },
            Op::Write {
                address: 4,
                data: 0x80,
            },
            Op::Bits {
                bits: vec![1, 0, 0],
            },
        ];
        let mut dev = SpiRegPeripheral::new();
        let outcomes = execute(&mut dev, &ops, fast()).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].is_committed());
        assert!(!outcomes[1].is_committed());
        assert_eq!(dev.registers().pwm_duty_cycle(), 0x80);
    }

    #[test]
    fn write_directly_after_reset_commits() {
        let ops = vec![
            Op::Reset { ticks: 5 },
            Op::Write {
                address: 1,
                data: 0x5A,
            },
        ];
        let mut dev = SpiRegPeripheral::new();
        let outcomes = execute(&mut dev, &ops, fast()).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_committed());
        assert_eq!(dev.registers().out_enable_high(), 0x5A);
    }

    #[test]
    fn bad_bits_and_addresses_are_errors() {
        let mut dev = SpiRegPeripheral::new();
        let err = execute(&mut dev, &[Op::Bits { bits: vec![2] }], fast()).unwrap_err();
        assert!(format!("{err:#}").contains("0 or 1"));

        let err = execute(
            &mut dev,
            &[Op::Write {
                address: 0x80,
                data: 0,
            }],
            fast(),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("7-bit"));
    }

    #[test]
    fn text_report_lists_every_register() {
        let dev = SpiRegPeripheral::new();
        let text = render(&dev, false).unwrap();
        assert_eq!(text.lines().count(), 5);
        assert!(text.starts_with("out_enable_low = 0x00"));
    }
}
