//! Panel state store
//!
//! Holds the button layout sent to the peer and flips the two toggle buttons.
//! Toggle state is read from the layout once, when the store is built, and
//! kept as explicit booleans afterwards. Icons and labels are derived from
//! those booleans. A button whose icon/label cannot show the state carries it
//! in its `_enabled` flag instead.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{HarnessError, Result};

pub const FOLLOW_ID: &str = "follow";
pub const TOGGLE_TOP_ID: &str = "toggle_top";
pub const QUIT_ID: &str = "quit";
pub const ACTIVE_ID: &str = "active";

pub const FOLLOW_ICON_ACTIVE: &str = "follow_active";
pub const FOLLOW_ICON_INACTIVE: &str = "follow";

pub const TOP_TEXT_ENABLED: &str = "✓置顶";
pub const TOP_TEXT_DISABLED: &str = "□置顶";

/// One control button. Rendered by icon or by text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Toggle state, present only on toggle buttons.
    #[serde(
        default,
        rename = "_enabled",
        alias = "enabled",
        skip_serializing_if = "Option::is_none"
    )]
    pub enabled: Option<bool>,
}

impl Button {
    pub fn icon(id: &str, icon: &str) -> Self {
        Self {
            id: id.to_string(),
            icon: Some(icon.to_string()),
            text: None,
            enabled: None,
        }
    }

    pub fn text(id: &str, text: &str) -> Self {
        Self {
            id: id.to_string(),
            icon: None,
            text: Some(text.to_string()),
            enabled: None,
        }
    }

    pub fn toggled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(false)
    }
}

/// Ordered button layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelConfig {
    pub buttons: Vec<Button>,
}

impl PanelConfig {
    /// The stock layout offered to a freshly connected peer.
    pub fn default_layout() -> Self {
        Self {
            buttons: vec![
                Button::icon("home", "home"),
                Button::icon("back", "back"),
                Button::icon("recent", "task"),
                Button::icon("volume_up", "v-plus"),
                Button::icon("volume_down", "v-minus"),
                Button::icon("screenshot", "screenshot"),
                Button::icon(QUIT_ID, "quit"),
                Button::icon(FOLLOW_ID, FOLLOW_ICON_ACTIVE),
                Button::text(ACTIVE_ID, "激活窗口"),
                Button {
                    id: TOGGLE_TOP_ID.to_string(),
                    icon: Some("top".to_string()),
                    text: Some(TOP_TEXT_DISABLED.to_string()),
                    enabled: None,
                },
            ],
        }
    }

    /// Ids must be unique and each button needs an icon or a text.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for button in &self.buttons {
            if !seen.insert(button.id.as_str()) {
                return Err(HarnessError::Config(format!(
                    "duplicate button id `{}`",
                    button.id
                )));
            }
            if button.icon.is_none() && button.text.is_none() {
                return Err(HarnessError::Config(format!(
                    "button `{}` has neither icon nor text",
                    button.id
                )));
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Button> {
        self.buttons.iter().find(|b| b.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Button> {
        self.buttons.iter_mut().find(|b| b.id == id)
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self::default_layout()
    }
}

/// State shown by a follow button. The icon wins when it is one of the two
/// follow variants.
fn shows_following(button: &Button) -> bool {
    match button.icon.as_deref() {
        Some(FOLLOW_ICON_ACTIVE) => true,
        Some(FOLLOW_ICON_INACTIVE) => false,
        _ => button.is_enabled(),
    }
}

/// State shown by a toggle_top button. The label wins when it is one of the
/// two top variants.
fn shows_on_top(button: &Button) -> bool {
    match button.text.as_deref() {
        Some(TOP_TEXT_ENABLED) => true,
        Some(TOP_TEXT_DISABLED) => false,
        _ => button.is_enabled(),
    }
}

/// The flag is required when nothing else on the button shows the state, and
/// kept in step whenever the layout set one.
fn sync_flag(button: &mut Button, state: bool, shown_elsewhere: bool) {
    if !shown_elsewhere || button.enabled.is_some() {
        button.enabled = Some(state);
    }
}

/// Session-scoped owner of the current panel.
#[derive(Debug, Clone)]
pub struct PanelStore {
    config: PanelConfig,
    following: bool,
    on_top: bool,
}

impl PanelStore {
    /// Seeds both toggle states from what `config` currently shows. A stored
    /// flag that disagrees with the icon or label is overwritten.
    pub fn new(mut config: PanelConfig) -> Self {
        let mut following = false;
        if let Some(button) = config.get_mut(FOLLOW_ID) {
            following = shows_following(button);
            let shown = button.icon.is_some();
            sync_flag(button, following, shown);
        }
        let mut on_top = false;
        if let Some(button) = config.get_mut(TOGGLE_TOP_ID) {
            on_top = shows_on_top(button);
            let shown = button.text.is_some();
            sync_flag(button, on_top, shown);
        }
        Self {
            config,
            following,
            on_top,
        }
    }

    pub fn current(&self) -> &PanelConfig {
        &self.config
    }

    pub fn is_following(&self) -> bool {
        self.following
    }

    pub fn is_on_top(&self) -> bool {
        self.on_top
    }

    fn button_mut(&mut self, id: &str) -> Result<&mut Button> {
        self.config
            .get_mut(id)
            .ok_or_else(|| HarnessError::Config(format!("no `{id}` button in panel layout")))
    }

    /// Flip the follow button. Returns the new state.
    pub fn toggle_follow(&mut self) -> Result<bool> {
        let following = !self.following;
        let button = self.button_mut(FOLLOW_ID)?;
        let shown = button.icon.is_some();
        if shown {
            let icon = if following {
                FOLLOW_ICON_ACTIVE
            } else {
                FOLLOW_ICON_INACTIVE
            };
            button.icon = Some(icon.to_string());
        }
        sync_flag(button, following, shown);
        self.following = following;
        Ok(following)
    }

    /// Flip the always-on-top button. Returns the new state so the caller can
    /// forward the matching `top` command.
    pub fn toggle_top(&mut self) -> Result<bool> {
        let on_top = !self.on_top;
        let button = self.button_mut(TOGGLE_TOP_ID)?;
        let shown = button.text.is_some();
        if shown {
            let text = if on_top {
                TOP_TEXT_ENABLED
            } else {
                TOP_TEXT_DISABLED
            };
            button.text = Some(text.to_string());
        }
        sync_flag(button, on_top, shown);
        self.on_top = on_top;
        Ok(on_top)
    }
}
