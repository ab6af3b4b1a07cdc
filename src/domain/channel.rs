// Channel domain model - Topic registry for the heat-pump feed
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Topic accepting a refresh trigger from the dashboard
pub const REFRESH_COMMAND_TOPIC: &str = "m5stick/command/refresh";
pub const REFRESH_COMMAND_PAYLOAD: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelId {
    Compressor,
    FanRpm,
    Current,
    TempModule,
    TempOutside,
    TempExchanger,
    TempDischarge,
    Mode,
    FanText,
    TempSet,
    TempRoom,
    TempPipe,
}

impl ChannelId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelId::Compressor => "compressor",
            ChannelId::FanRpm => "fan_rpm",
            ChannelId::Current => "current",
            ChannelId::TempModule => "temp_module",
            ChannelId::TempOutside => "temp_outside",
            ChannelId::TempExchanger => "temp_exchanger",
            ChannelId::TempDischarge => "temp_discharge",
            ChannelId::Mode => "mode",
            ChannelId::FanText => "fan_text",
            ChannelId::TempSet => "temp_set",
            ChannelId::TempRoom => "temp_room",
            ChannelId::TempPipe => "temp_pipe",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartId {
    Indoor,
    Outdoor,
    Current,
    Compressor,
    Fan,
}

impl ChartId {
    pub const ALL: [ChartId; 5] = [
        ChartId::Indoor,
        ChartId::Outdoor,
        ChartId::Current,
        ChartId::Compressor,
        ChartId::Fan,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            ChartId::Indoor => "Indoor unit temperatures",
            ChartId::Outdoor => "Outdoor unit temperatures",
            ChartId::Current => "Compressor current",
            ChartId::Compressor => "Compressor frequency",
            ChartId::Fan => "Outdoor fan speed",
        }
    }

    /// Series names, in the order the channel bindings index them
    pub fn series_names(&self) -> &'static [&'static str] {
        match self {
            ChartId::Indoor => &["Room", "Pipe", "Setpoint"],
            ChartId::Outdoor => &["Module", "Outside", "Exchanger", "Discharge"],
            ChartId::Current => &["Current [A]"],
            ChartId::Compressor => &["Frequency [Hz]"],
            ChartId::Fan => &["Fan [rpm]"],
        }
    }
}

/// One plotted line within a chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesRef {
    pub chart: ChartId,
    pub series: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Numeric,
    Categorical,
}

/// How a channel's payload is dispatched once resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    NumericSingle(ChartId),
    NumericMulti(SeriesRef),
    Categorical,
}

impl Binding {
    pub fn kind(&self) -> ChannelKind {
        match self {
            Binding::Categorical => ChannelKind::Categorical,
            _ => ChannelKind::Numeric,
        }
    }

    pub fn series(&self) -> Option<SeriesRef> {
        match self {
            Binding::NumericSingle(chart) => Some(SeriesRef {
                chart: *chart,
                series: 0,
            }),
            Binding::NumericMulti(series) => Some(*series),
            Binding::Categorical => None,
        }
    }
}

/// Which physical unit of the heat pump a channel belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitSection {
    Outdoor,
    Indoor,
}

#[derive(Debug, Clone)]
pub struct Channel {
    pub id: ChannelId,
    pub topic: &'static str,
    pub label: &'static str,
    pub unit: &'static str,
    pub section: UnitSection,
    pub binding: Binding,
    pub default_value: &'static str,
}

impl Channel {
    pub fn kind(&self) -> ChannelKind {
        self.binding.kind()
    }
}

const fn multi(chart: ChartId, series: usize) -> Binding {
    Binding::NumericMulti(SeriesRef { chart, series })
}

const STANDARD_CHANNELS: [Channel; 12] = [
    Channel {
        id: ChannelId::Compressor,
        topic: "m5stick/external/compressor",
        label: "Compressor",
        unit: "Hz",
        section: UnitSection::Outdoor,
        binding: Binding::NumericSingle(ChartId::Compressor),
        default_value: "45",
    },
    Channel {
        id: ChannelId::FanRpm,
        topic: "m5stick/external/fan",
        label: "Outdoor fan",
        unit: "rpm",
        section: UnitSection::Outdoor,
        binding: Binding::NumericSingle(ChartId::Fan),
        default_value: "1200",
    },
    Channel {
        id: ChannelId::Current,
        topic: "m5stick/external/current",
        label: "Current",
        unit: "A",
        section: UnitSection::Outdoor,
        binding: Binding::NumericSingle(ChartId::Current),
        default_value: "3.2",
    },
    Channel {
        id: ChannelId::TempModule,
        topic: "m5stick/external/temp_module",
        label: "Module temp.",
        unit: "°C",
        section: UnitSection::Outdoor,
        binding: multi(ChartId::Outdoor, 0),
        default_value: "35.5",
    },
    Channel {
        id: ChannelId::TempOutside,
        topic: "m5stick/external/temp_outside",
        label: "Outside temp.",
        unit: "°C",
        section: UnitSection::Outdoor,
        binding: multi(ChartId::Outdoor, 1),
        default_value: "22.0",
    },
    Channel {
        id: ChannelId::TempExchanger,
        topic: "m5stick/external/temp_exchanger",
        label: "Exchanger temp.",
        unit: "°C",
        section: UnitSection::Outdoor,
        binding: multi(ChartId::Outdoor, 2),
        default_value: "40.5",
    },
    Channel {
        id: ChannelId::TempDischarge,
        topic: "m5stick/external/temp_discharge",
        label: "Discharge temp.",
        unit: "°C",
        section: UnitSection::Outdoor,
        binding: multi(ChartId::Outdoor, 3),
        default_value: "55.0",
    },
    Channel {
        id: ChannelId::Mode,
        topic: "m5stick/internal/mode",
        label: "Operating mode",
        unit: "",
        section: UnitSection::Indoor,
        binding: Binding::Categorical,
        default_value: "Auto",
    },
    Channel {
        id: ChannelId::FanText,
        topic: "m5stick/internal/fan",
        label: "Indoor fan",
        unit: "",
        section: UnitSection::Indoor,
        binding: Binding::Categorical,
        default_value: "Medium",
    },
    Channel {
        id: ChannelId::TempSet,
        topic: "m5stick/internal/temp_set",
        label: "Setpoint",
        unit: "°C",
        section: UnitSection::Indoor,
        binding: multi(ChartId::Indoor, 2),
        default_value: "22.0",
    },
    Channel {
        id: ChannelId::TempRoom,
        topic: "m5stick/internal/temp_room",
        label: "Room temp.",
        unit: "°C",
        section: UnitSection::Indoor,
        binding: multi(ChartId::Indoor, 0),
        default_value: "21.5",
    },
    Channel {
        id: ChannelId::TempPipe,
        topic: "m5stick/internal/temp_pipe",
        label: "Pipe temp.",
        unit: "°C",
        section: UnitSection::Indoor,
        binding: multi(ChartId::Indoor, 1),
        default_value: "18.5",
    },
];

/// Static lookup from topic strings to channel descriptors
#[derive(Debug, Clone)]
pub struct TopicRegistry {
    channels: Vec<Channel>,
    by_topic: HashMap<&'static str, usize>,
}

impl TopicRegistry {
    pub fn standard() -> Self {
        Self::from_channels(STANDARD_CHANNELS.to_vec())
    }

    fn from_channels(channels: Vec<Channel>) -> Self {
        let mut by_topic = HashMap::with_capacity(channels.len());
        for (index, channel) in channels.iter().enumerate() {
            let previous = by_topic.insert(channel.topic, index);
            debug_assert!(previous.is_none(), "duplicate topic {}", channel.topic);
        }
        Self { channels, by_topic }
    }

    /// Unknown topics resolve to None; callers ignore them for tiles and charts
    pub fn resolve(&self, topic: &str) -> Option<&Channel> {
        self.by_topic.get(topic).map(|&index| &self.channels[index])
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn topics(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.channels.iter().map(|c| c.topic)
    }

    pub fn topic_of(&self, id: ChannelId) -> Option<&'static str> {
        self.channel(id).map(|c| c.topic)
    }
}

impl Default for TopicRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
