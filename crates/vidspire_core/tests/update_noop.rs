use vidspire_core::{update, AppState, Msg};

#[test]
fn tick_does_not_touch_state() {
    let state = AppState::new();
    let (next, effects) = update(state.clone(), Msg::Tick);

    assert_eq!(state, next);
    assert!(effects.is_empty());
}

#[test]
fn tick_keeps_a_running_job_untouched() {
    let state = AppState::new();
    let (state, _) = update(state, Msg::InputChanged("https://youtu.be/X".to_string()));
    let (state, _) = update(state, Msg::Submitted { now: 1_700_000_000_000 });
    let (next, effects) = update(state.clone(), Msg::Tick);

    assert_eq!(state, next);
    assert!(effects.is_empty());
}
