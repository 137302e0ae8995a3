use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common::{Participant, ParticipantId, Presence, Room, RoomId, SelfIdentity};

pub const DEFAULT_CONFIG_PATH: &str = "config/chat.json";

/// Everything a session needs at start-up. Every section falls back to the demo
/// defaults when missing from the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub identity: SelfIdentity,
    pub rooms: Vec<Room>,
    pub participants: Vec<Participant>,
    /// Canned content the synthesizer posts, per room.
    pub phrases: BTreeMap<RoomId, Vec<String>>,
    /// Canned answers to the local user's messages, per room.
    pub replies: BTreeMap<RoomId, Vec<String>>,
    pub history: Vec<HistoryEntry>,
    pub initial_room: RoomId,
    pub connect_delay_ms: u64,
    pub typing: TypingConfig,
    pub delivery: DeliveryConfig,
    pub synth: SynthConfig,
}

/// A message that predates the session, `age_secs` before start-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub room: RoomId,
    pub author: ParticipantId,
    pub content: String,
    pub age_secs: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TypingConfig {
    /// Input-idle threshold for the local user's own typing state.
    pub debounce_ms: u64,
    /// Lifetime of a typing signal received from someone else.
    pub remote_ttl_ms: u64,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            remote_ttl_ms: 6000,
        }
    }
}

impl TypingConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn remote_ttl(&self) -> Duration {
        Duration::from_millis(self.remote_ttl_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Fixed simulated delays.
    #[default]
    Fixed,
    /// Statuses only change when a transport acknowledges them.
    Acknowledged,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub mode: DeliveryMode,
    pub sent_after_ms: u64,
    pub read_after_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            mode: DeliveryMode::Fixed,
            sent_after_ms: 500,
            read_after_ms: 2000,
        }
    }
}

/// Inclusive millisecond range a random delay is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeMs {
    pub min: u64,
    pub max: u64,
}

impl RangeMs {
    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    /// Bounds in ascending order, whatever the file said.
    pub fn bounds(&self) -> (u64, u64) {
        if self.min <= self.max {
            (self.min, self.max)
        } else {
            (self.max, self.min)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    pub message_interval_ms: RangeMs,
    pub message_probability: f64,
    pub typing_interval_ms: RangeMs,
    pub typing_probability: f64,
    pub typing_hold_ms: RangeMs,
    pub reply_probability: f64,
    pub reply_delay_ms: RangeMs,
    /// Only let participants post in rooms they list as favorites.
    pub respect_favorites: bool,
    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            message_interval_ms: RangeMs::new(5000, 15000),
            message_probability: 0.2,
            typing_interval_ms: RangeMs::new(3000, 10000),
            typing_probability: 0.3,
            typing_hold_ms: RangeMs::new(2000, 5000),
            reply_probability: 0.0,
            reply_delay_ms: RangeMs::new(1500, 4000),
            respect_favorites: false,
            seed: None,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            identity: SelfIdentity {
                id: ParticipantId(1),
                name: "Demo User".to_string(),
                avatar: "👤".to_string(),
                is_premium: false,
            },
            rooms: default_rooms(),
            participants: default_participants(),
            phrases: default_phrases(),
            replies: default_replies(),
            history: default_history(),
            initial_room: RoomId::from("general"),
            connect_delay_ms: 1000,
            typing: TypingConfig::default(),
            delivery: DeliveryConfig::default(),
            synth: SynthConfig::default(),
        }
    }
}

impl ChatConfig {
    pub fn connect_delay(&self) -> Duration {
        Duration::from_millis(self.connect_delay_ms)
    }
}

/// Read the session config at `path`. A missing or malformed file is never
/// fatal: the demo defaults stand in for it.
pub fn load_config(path: &str) -> ChatConfig {
    let path = Path::new(path);
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            log::info!("No chat config at {}; using the demo rooms", path.display());
            return ChatConfig::default();
        }
        Err(err) => {
            log::warn!("Cannot read chat config {}: {err}; using the demo rooms", path.display());
            return ChatConfig::default();
        }
    };

    match serde_json::from_str::<ChatConfig>(&content) {
        Ok(config) => {
            log::info!(
                "Loaded {} rooms and {} participants from {}",
                config.rooms.len(),
                config.participants.len(),
                path.display()
            );
            config
        }
        Err(err) => {
            log::warn!("Chat config {} is not valid JSON ({err}); using the demo rooms", path.display());
            ChatConfig::default()
        }
    }
}

/// Write `config` as pretty JSON, creating parent directories as needed.
pub fn save_config(path: &str, config: &ChatConfig) -> io::Result<()> {
    let path = Path::new(path);
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, serde_json::to_string_pretty(config)?)
}

fn default_rooms() -> Vec<Room> {
    [
        ("general", "General Discussion", "General crypto discussions"),
        ("trading", "Trading Signals", "Share trading insights"),
        ("alerts", "Price Alerts", "Automated price notifications"),
        ("premium", "Premium Members", "Exclusive premium chat"),
    ]
    .into_iter()
    .map(|(id, name, description)| Room {
        id: RoomId::from(id),
        name: name.to_string(),
        description: description.to_string(),
    })
    .collect()
}

fn default_participants() -> Vec<Participant> {
    [
        (2, "Alice Chen", "👩‍💼", Presence::Online, &["trading", "general"][..]),
        (3, "Bob Martinez", "👨‍💻", Presence::Online, &["general", "alerts"][..]),
        (4, "Carol Johnson", "👩‍🔬", Presence::Away, &["trading", "premium"][..]),
        (5, "David Kim", "👨‍🎨", Presence::Online, &["general"][..]),
        (6, "Emma Wilson", "👩‍🚀", Presence::Offline, &["premium", "trading"][..]),
    ]
    .into_iter()
    .map(|(id, name, avatar, status, favorites)| Participant {
        id: ParticipantId(id),
        name: name.to_string(),
        avatar: avatar.to_string(),
        status,
        favorite_rooms: favorites.iter().map(|room| RoomId::from(*room)).collect(),
    })
    .collect()
}

fn phrase_table(entries: &[(&str, &[&str])]) -> BTreeMap<RoomId, Vec<String>> {
    entries
        .iter()
        .map(|(room, lines)| {
            (
                RoomId::from(*room),
                lines.iter().map(|line| line.to_string()).collect(),
            )
        })
        .collect()
}

fn default_phrases() -> BTreeMap<RoomId, Vec<String>> {
    phrase_table(&[
        (
            "general",
            &[
                "Bitcoin is showing strong support at $42k 💪",
                "Anyone else watching the ETH/BTC ratio?",
                "This market volatility is insane today!",
                "Just set up some DCA orders for the weekend",
                "The fear and greed index is at 25 - time to buy? 🤔",
                "Altcoin season might be starting soon",
                "Remember to take profits on the way up! 📈",
                "HODL strong, diamond hands! 💎🙌",
                "What do you think about the new regulations?",
                "Technical analysis is looking bullish for Q4",
            ],
        ),
        (
            "trading",
            &[
                "Long BTC at $42,150 with tight stop loss",
                "ETH breaking out of the triangle pattern 📊",
                "Volume is picking up on major altcoins",
                "RSI showing oversold conditions on the 4H",
                "Support level holding strong at $41,800",
                "Resistance at $43,500 needs to be broken",
                "Setting alerts for key Fibonacci levels",
                "Options flow showing bullish sentiment",
                "Whale movements detected on-chain 🐋",
                "Perfect entry point for swing trades",
            ],
        ),
        (
            "alerts",
            &[
                "🚨 BTC Alert: Price crossed $42,500",
                "📊 ETH Alert: Volume spike detected",
                "⚠️ DOGE Alert: 15% price increase in 1H",
                "🔔 Portfolio Alert: Daily gain target reached",
                "📈 SOL Alert: Breaking resistance at $95",
                "⏰ Reminder: DCA order executed",
                "🎯 Target Alert: Take profit level hit",
                "📉 Stop Loss Alert: Position closed",
                "🔥 Trending Alert: AVAX gaining momentum",
                "💡 Opportunity Alert: Arbitrage detected",
            ],
        ),
        (
            "premium",
            &[
                "Exclusive alpha: New DeFi protocol launching next week",
                "Institutional flow data shows accumulation",
                "Private sale opportunity in promising L2 project",
                "Whale wallet analysis reveals interesting patterns",
                "Advanced TA: Hidden divergence on multiple timeframes",
                "Insider info: Major exchange listing coming",
                "Premium signal: Long-term accumulation zone",
                "VIP access: Early beta testing for new DEX",
                "Exclusive research: Tokenomics deep dive",
                "Premium community: AMA with project founder",
            ],
        ),
    ])
}

fn default_replies() -> BTreeMap<RoomId, Vec<String>> {
    phrase_table(&[
        (
            "general",
            &[
                "Interesting point! 🤔",
                "I agree with that analysis",
                "Thanks for sharing!",
                "What do you think about the long-term outlook?",
                "Good observation 👍",
            ],
        ),
        (
            "trading",
            &[
                "Nice setup! What's your target?",
                "I'm seeing similar patterns",
                "Risk management is key here",
                "Volume confirms the breakout",
                "Solid technical analysis 📊",
            ],
        ),
        (
            "alerts",
            &[
                "Thanks for the heads up!",
                "Setting up my alerts now",
                "Perfect timing on that notification",
                "Appreciate the update 🔔",
                "Good catch!",
            ],
        ),
        (
            "premium",
            &[
                "Exclusive insights as always",
                "This alpha is gold 🏆",
                "Premium content at its finest",
                "Thanks for the insider perspective",
                "VIP information is invaluable",
            ],
        ),
    ])
}

fn default_history() -> Vec<HistoryEntry> {
    [
        ("general", 2, "Hey everyone! Bitcoin is looking strong today 🚀", 300),
        ("general", 3, "Agreed! The technical indicators are very bullish", 240),
        ("alerts", 4, "Just set up some alerts for ETH at $2500", 180),
        ("trading", 5, "Check out this analysis I found: https://example.com/crypto-analysis", 120),
    ]
    .into_iter()
    .map(|(room, author, content, age_secs)| HistoryEntry {
        room: RoomId::from(room),
        author: ParticipantId(author),
        content: content.to_string(),
        age_secs,
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_missing_sections() {
        let config: ChatConfig = serde_json::from_str(
            r#"{ "connect_delay_ms": 0, "typing": { "debounce_ms": 250 }, "synth": { "seed": 7 } }"#,
        )
        .unwrap();

        assert_eq!(config.connect_delay_ms, 0);
        assert_eq!(config.typing.debounce_ms, 250);
        assert_eq!(config.typing.remote_ttl_ms, 6000);
        assert_eq!(config.synth.seed, Some(7));
        assert_eq!(config.synth.message_probability, 0.2);
        assert_eq!(config.rooms.len(), 4);
        assert_eq!(config.participants.len(), 5);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config("definitely/not/here.json");
        assert_eq!(config.initial_room, RoomId::from("general"));
        assert_eq!(config.delivery.mode, DeliveryMode::Fixed);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!("room_chat_broken_{}.json", std::process::id()));
        fs::write(&path, "{ rooms: nope").unwrap();
        let config = load_config(&path.to_string_lossy());
        let _ = fs::remove_file(&path);

        assert_eq!(config.rooms.len(), 4);
        assert_eq!(config.history.len(), 4);
    }

    #[test]
    fn every_default_room_has_phrases_and_replies() {
        let config = ChatConfig::default();
        for room in &config.rooms {
            assert!(config.phrases.get(&room.id).is_some_and(|p| !p.is_empty()));
            assert!(config.replies.get(&room.id).is_some_and(|r| !r.is_empty()));
        }
    }

    #[test]
    fn reversed_range_is_normalized() {
        assert_eq!(RangeMs::new(900, 100).bounds(), (100, 900));
    }

    #[test]
    fn config_round_trips_through_a_file() {
        let path = std::env::temp_dir().join(format!("room_chat_config_{}.json", std::process::id()));
        let path = path.to_string_lossy().to_string();
        let mut config = ChatConfig::default();
        config.synth.seed = Some(99);

        save_config(&path, &config).unwrap();
        let loaded = load_config(&path);
        let _ = fs::remove_file(&path);

        assert_eq!(loaded.synth.seed, Some(99));
        assert_eq!(loaded.history.len(), config.history.len());
    }
}
