//! Remote buttons and the vendor key names the box understands.

use crate::error::UnsupportedKey;

/// Key names sent by the session itself rather than translated from a button
pub mod names {
    pub const POWER: &str = "power";
    pub const HOME: &str = "home";
    pub const TV_GUIDE: &str = "tvguide";
    pub const BACK: &str = "backup";
    pub const INFO: &str = "i";
}

/// Remote buttons the HomeKit remote can send, with their `RemoteKey` codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RemoteButton {
    Rewind = 0,
    FastForward = 1,
    NextTrack = 2,
    PreviousTrack = 3,
    ArrowUp = 4,
    ArrowDown = 5,
    ArrowLeft = 6,
    ArrowRight = 7,
    Select = 8,
    Back = 9,
    Exit = 10,
    PlayPause = 11,
    Information = 15,
}

impl RemoteButton {
    pub const ALL: [RemoteButton; 13] = [
        RemoteButton::Rewind,
        RemoteButton::FastForward,
        RemoteButton::NextTrack,
        RemoteButton::PreviousTrack,
        RemoteButton::ArrowUp,
        RemoteButton::ArrowDown,
        RemoteButton::ArrowLeft,
        RemoteButton::ArrowRight,
        RemoteButton::Select,
        RemoteButton::Back,
        RemoteButton::Exit,
        RemoteButton::PlayPause,
        RemoteButton::Information,
    ];

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|button| button.code() == code)
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Fixed mapping from remote buttons to vendor key names.
///
/// Next/previous track and exit are left out on purpose.
#[derive(Debug, Clone, Copy)]
pub struct RemoteKeyMap {
    table: &'static [(RemoteButton, &'static str)],
}

const SKY_KEYS: &[(RemoteButton, &str)] = &[
    (RemoteButton::Rewind, "rewind"),
    (RemoteButton::FastForward, "fastforward"),
    (RemoteButton::ArrowUp, "up"),
    (RemoteButton::ArrowDown, "down"),
    (RemoteButton::ArrowLeft, "left"),
    (RemoteButton::ArrowRight, "right"),
    (RemoteButton::Select, "select"),
    (RemoteButton::Back, names::BACK),
    (RemoteButton::PlayPause, "play"),
    (RemoteButton::Information, names::INFO),
];

impl RemoteKeyMap {
    pub fn new() -> Self {
        Self { table: SKY_KEYS }
    }

    pub fn translate(&self, button: RemoteButton) -> Result<&'static str, UnsupportedKey> {
        self.table
            .iter()
            .find(|(b, _)| *b == button)
            .map(|(_, name)| *name)
            .ok_or(UnsupportedKey(button.code()))
    }

    /// Translate a raw `RemoteKey` code, rejecting codes that are not buttons at all
    pub fn translate_code(&self, code: u8) -> Result<&'static str, UnsupportedKey> {
        let button = RemoteButton::from_code(code).ok_or(UnsupportedKey(code))?;
        self.translate(button)
    }

    pub fn supported(&self) -> impl Iterator<Item = RemoteButton> + '_ {
        self.table.iter().map(|(button, _)| *button)
    }
}

impl Default for RemoteKeyMap {
    fn default() -> Self {
        Self::new()
    }
}
