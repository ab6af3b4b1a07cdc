// Synthetic feed - Plausible heat pump readings for exercising the dashboard
use crate::domain::channel::ChannelId;
use chrono::{DateTime, Local, Timelike, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const MODES: [&str; 3] = ["Cooling", "Heating", "Auto"];
const FAN_LEVELS: [&str; 3] = ["Low", "Medium", "High"];

pub struct SyntheticFeed {
    rng: StdRng,
}

impl SyntheticFeed {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// One reading for every channel, shaped by the local time of day
    pub fn full_reading(&mut self, now: DateTime<Utc>) -> Vec<(ChannelId, String)> {
        let local = now.with_timezone(&Local);
        let minutes = local.minute() as f64;
        let hour = local.hour();
        let daytime = (6..22).contains(&hour);

        let wave = |period: f64| (minutes / period).sin();

        let outside = if daytime {
            18.0
        } else {
            12.0 + self.jitter(3.0)
        };

        vec![
            (
                ChannelId::TempRoom,
                format!("{:.1}", 21.0 + wave(30.0) * 1.5 + self.jitter(0.5)),
            ),
            (ChannelId::TempOutside, format!("{:.1}", outside)),
            (
                ChannelId::Compressor,
                format!("{}", (40.0 + wave(15.0) * 10.0 + self.jitter(5.0)).floor()),
            ),
            (
                ChannelId::FanRpm,
                format!("{}", (800.0 + wave(20.0) * 200.0 + self.jitter(50.0)).floor()),
            ),
            (
                ChannelId::Current,
                format!("{:.2}", 2.5 + wave(30.0) * 0.8 + self.jitter(0.2)),
            ),
            (
                ChannelId::TempModule,
                format!("{:.1}", 35.0 + wave(25.0) * 5.0 + self.jitter(2.0)),
            ),
            (
                ChannelId::TempExchanger,
                format!("{:.1}", 40.0 + wave(20.0) * 7.0 + self.jitter(3.0)),
            ),
            (
                ChannelId::TempDischarge,
                format!("{:.1}", 55.0 + wave(15.0) * 10.0 + self.jitter(5.0)),
            ),
            (ChannelId::Mode, self.pick(&MODES)),
            (ChannelId::FanText, self.pick(&FAN_LEVELS)),
            (ChannelId::TempSet, format!("{:.1}", 22.0 + self.jitter(1.0))),
            (
                ChannelId::TempPipe,
                format!("{:.1}", 18.0 + wave(35.0) * 3.0 + self.jitter(1.0)),
            ),
        ]
    }

    /// Room temperature nudge sent by auto-refresh
    pub fn room_temperature(&mut self) -> String {
        format!("{:.1}", 21.0 + self.jitter(2.0))
    }

    fn jitter(&mut self, span: f64) -> f64 {
        self.rng.gen_range(0.0..span)
    }

    fn pick(&mut self, options: &[&str]) -> String {
        options
            .choose(&mut self.rng)
            .copied()
            .unwrap_or_default()
            .to_string()
    }
}

impl Default for SyntheticFeed {
    fn default() -> Self {
        Self::new()
    }
}
