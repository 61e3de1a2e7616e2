//! Transport position snapshot.
//!
//! The host is queried once per block. A successful query produces a new
//! [`Position`]; a failed one leaves the previous snapshot in place.

/// Raw transport information returned by the host.
///
/// Converts the host's validity flags to `Option<T>`: a field is `None` when
/// the host did not mark it valid.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeInfo {
    pub sample_rate: f64,
    pub sample_pos: f64,
    pub tempo: Option<f64>,
    /// Musical position in quarter notes.
    pub ppq_pos: Option<f64>,
    /// Start of the current bar in quarter notes.
    pub bar_start_pos: Option<f64>,
    pub time_sig_numerator: Option<i32>,
    pub time_sig_denominator: Option<i32>,
}

/// Musical-time snapshot handed to the engine every block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub sample_rate: f64,
    pub speed: f64,
    /// Current sample frame.
    pub frame: u64,
    pub numerator: f64,
    pub denominator: f64,
    pub beats_per_minute: f64,
    /// Position inside the current beat, in ticks.
    pub tick: f64,
    pub ticks_per_beat: f64,
}

impl Default for Position {
    fn default() -> Self {
        Self {
            sample_rate: 0.0,
            speed: 1.0,
            frame: 0,
            numerator: 4.0,
            denominator: 4.0,
            beats_per_minute: 120.0,
            tick: 0.0,
            ticks_per_beat: crate::config::DEFAULT_TICKS_PER_BEAT,
        }
    }
}

impl Position {
    pub fn new(ticks_per_beat: f64) -> Self {
        Self {
            ticks_per_beat,
            ..Self::default()
        }
    }

    /// Derive the next snapshot from host information.
    ///
    /// Fields the host did not mark valid keep their previous values.
    pub fn advance(&self, info: &TimeInfo) -> Position {
        let mut next = *self;
        next.sample_rate = info.sample_rate;
        next.speed = 1.0;
        next.frame = info.sample_pos.max(0.0) as u64;

        if let (Some(num), Some(den)) = (info.time_sig_numerator, info.time_sig_denominator) {
            next.numerator = f64::from(num);
            next.denominator = f64::from(den);

            if let (Some(ppq), Some(bar_start)) = (info.ppq_pos, info.bar_start_pos) {
                let beats = (ppq - bar_start) * f64::from(den) * 0.25;
                next.tick = next.ticks_per_beat * beats.fract();
            }
        }

        if let Some(tempo) = info.tempo {
            next.beats_per_minute = tempo;
        }

        next
    }
}
