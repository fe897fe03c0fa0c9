use proptest::prelude::*;

use panel_harness::panel::{
    Button, FOLLOW_ICON_ACTIVE, FOLLOW_ICON_INACTIVE, FOLLOW_ID, TOGGLE_TOP_ID, TOP_TEXT_DISABLED,
    TOP_TEXT_ENABLED,
};
use panel_harness::protocol::ControlMessage;
use panel_harness::{PanelConfig, PanelStore};

#[derive(Debug, Clone, Copy)]
enum Toggle {
    Follow,
    Top,
}

fn arb_toggle() -> impl Strategy<Value = Toggle> {
    prop_oneof![Just(Toggle::Follow), Just(Toggle::Top)]
}

/// Toggle buttons as a config file might declare them: either variant of the
/// icon/label, with or without a (possibly contradicting) stored flag.
fn arb_configured_layout() -> impl Strategy<Value = PanelConfig> {
    (
        prop_oneof![Just(FOLLOW_ICON_ACTIVE), Just(FOLLOW_ICON_INACTIVE)],
        prop::option::of(any::<bool>()),
        prop_oneof![Just(TOP_TEXT_ENABLED), Just(TOP_TEXT_DISABLED)],
        prop::option::of(any::<bool>()),
    )
        .prop_map(|(icon, follow_flag, text, top_flag)| {
            let mut follow = Button::icon(FOLLOW_ID, icon);
            follow.enabled = follow_flag;
            let mut top = Button::text(TOGGLE_TOP_ID, text);
            top.enabled = top_flag;
            PanelConfig {
                buttons: vec![Button::icon("home", "home"), follow, top],
            }
        })
}

fn apply(store: &mut PanelStore, toggle: Toggle) -> bool {
    match toggle {
        Toggle::Follow => store.toggle_follow().unwrap(),
        Toggle::Top => store.toggle_top().unwrap(),
    }
}

// --- Toggle algebra ---

proptest! {
    #[test]
    fn double_toggle_is_identity(seq in prop::collection::vec(arb_toggle(), 0..16)) {
        let mut store = PanelStore::new(PanelConfig::default_layout());
        for t in &seq {
            apply(&mut store, *t);
        }
        let before = store.current().clone();
        for t in &seq {
            apply(&mut store, *t);
            apply(&mut store, *t);
        }
        prop_assert_eq!(store.current(), &before);
    }

    #[test]
    fn toggle_result_matches_shown_state(seq in prop::collection::vec(arb_toggle(), 1..16)) {
        let mut store = PanelStore::new(PanelConfig::default_layout());
        for t in seq {
            let state = apply(&mut store, t);
            let panel = store.current();
            match t {
                Toggle::Follow => {
                    prop_assert_eq!(store.is_following(), state);
                    let icon = if state { FOLLOW_ICON_ACTIVE } else { FOLLOW_ICON_INACTIVE };
                    prop_assert_eq!(panel.get(FOLLOW_ID).unwrap().icon.as_deref(), Some(icon));
                }
                Toggle::Top => {
                    prop_assert_eq!(store.is_on_top(), state);
                    let text = if state { TOP_TEXT_ENABLED } else { TOP_TEXT_DISABLED };
                    prop_assert_eq!(panel.get(TOGGLE_TOP_ID).unwrap().text.as_deref(), Some(text));
                }
            }
        }
    }

    #[test]
    fn configured_layouts_toggle_from_what_they_show(
        layout in arb_configured_layout(),
        seq in prop::collection::vec(arb_toggle(), 0..8),
    ) {
        let shows_following = layout.get(FOLLOW_ID).unwrap().icon.as_deref() == Some(FOLLOW_ICON_ACTIVE);
        let shows_on_top = layout.get(TOGGLE_TOP_ID).unwrap().text.as_deref() == Some(TOP_TEXT_ENABLED);

        let mut store = PanelStore::new(layout);
        prop_assert_eq!(store.is_following(), shows_following);
        prop_assert_eq!(store.is_on_top(), shows_on_top);

        // The first flip always changes what the peer sees.
        prop_assert_eq!(store.toggle_follow().unwrap(), !shows_following);
        prop_assert_eq!(store.toggle_top().unwrap(), !shows_on_top);
        store.toggle_follow().unwrap();
        store.toggle_top().unwrap();

        let before = store.current().clone();
        for t in &seq {
            apply(&mut store, *t);
            apply(&mut store, *t);
        }
        prop_assert_eq!(store.current(), &before);
    }

    #[test]
    fn icon_mode_top_flag_alternates(n in 1usize..20) {
        let mut store = PanelStore::new(PanelConfig {
            buttons: vec![Button::icon(TOGGLE_TOP_ID, "top")],
        });
        for i in 0..n {
            prop_assert_eq!(store.toggle_top().unwrap(), i % 2 == 0);
        }
    }

    #[test]
    fn toggles_never_reorder_buttons(seq in prop::collection::vec(arb_toggle(), 0..16)) {
        let mut store = PanelStore::new(PanelConfig::default_layout());
        let ids: Vec<String> = store.current().buttons.iter().map(|b| b.id.clone()).collect();
        for t in seq {
            apply(&mut store, t);
        }
        let after: Vec<String> = store.current().buttons.iter().map(|b| b.id.clone()).collect();
        prop_assert_eq!(ids, after);
    }
}

// --- Codec ---

proptest! {
    #[test]
    fn decode_never_panics(raw in ".{0,64}") {
        let _ = ControlMessage::decode(&raw);
    }

    #[test]
    fn encoded_messages_decode(kind in "[a-z_]{1,16}", x in any::<i64>()) {
        let mut data = serde_json::Map::new();
        data.insert("x".to_string(), serde_json::Value::from(x));
        let msg = ControlMessage::with_data(kind, data);
        prop_assert_eq!(ControlMessage::decode(&msg.encode().unwrap()).unwrap(), msg);
    }
}
