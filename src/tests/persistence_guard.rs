use super::*;
use pretty_assertions::assert_eq;

fn styled_hero(engine: &mut DomChangesEngine) -> Result<(Page, NodeId)> {
    let mut page = page_with_body(r#"<div id="hero" style="color: blue">x</div>"#)?;
    let hero = first(&page, "#hero")?;
    let style = change(r##"{"selector": "#hero", "type": "style", "value": {"color": "red"}}"##)?;
    assert!(engine.apply_change(&mut page, &style, "exp1"));
    engine.pump(&mut page)?;
    engine.take_trace_logs();
    Ok((page, hero))
}

#[test]
fn overwritten_inline_style_is_restored_within_one_pump() -> Result<()> {
    let mut engine = DomChangesEngine::new(EngineConfig::default());
    let (mut page, hero) = styled_hero(&mut engine)?;
    assert_eq!(engine.watched_node_count(), 1);

    page.set_style_property(hero, "color", "green", false)?;
    let steps = engine.pump(&mut page)?;

    assert_eq!(page.style_property(hero, "color"), "red");
    // Overwrite delivery, the replay's own record, then the guard release.
    assert_eq!(steps, 3);
    assert_eq!(engine.state.persistence.guard_state(hero), GuardState::Idle);
    assert_eq!(page.pending_task_count(), 0);
    assert!(!page.has_mutation_records());
    Ok(())
}

#[test]
fn priority_drift_is_restored_too() -> Result<()> {
    let mut engine = DomChangesEngine::new(EngineConfig::default());
    let (mut page, hero) = styled_hero(&mut engine)?;

    page.set_style_property(hero, "color", "red", true)?;
    engine.pump(&mut page)?;
    assert_eq!(page.style_property(hero, "color"), "red");
    assert!(!page.style_priority(hero, "color"));
    Ok(())
}

#[test]
fn queued_overwrites_are_replayed_once() -> Result<()> {
    let mut engine = DomChangesEngine::new(EngineConfig::default());
    let (mut page, hero) = styled_hero(&mut engine)?;

    page.set_style_property(hero, "color", "green", false)?;
    page.set_attr(hero, "style", "color: yellow; padding: 1px")?;
    let steps = engine.pump(&mut page)?;

    assert_eq!(steps, 3);
    assert_eq!(page.style_property(hero, "color"), "red");
    assert_eq!(page.style_property(hero, "padding"), "1px");
    Ok(())
}

#[test]
fn unrelated_mutations_do_not_trigger_replay() -> Result<()> {
    let mut engine = DomChangesEngine::new(EngineConfig::default());
    let (mut page, hero) = styled_hero(&mut engine)?;

    page.set_attr(hero, "title", "hi")?;
    page.set_style_property(hero, "margin", "0", false)?;
    let steps = engine.pump(&mut page)?;
    assert_eq!(steps, 1);
    assert_eq!(page.pending_task_count(), 0);
    assert_eq!(page.style_property(hero, "color"), "red");
    Ok(())
}

#[test]
fn replay_logs_are_throttled_per_experiment_and_selector() -> Result<()> {
    let mut engine = traced_engine();
    let (mut page, hero) = styled_hero(&mut engine)?;

    page.set_style_property(hero, "color", "green", false)?;
    engine.pump(&mut page)?;
    assert_eq!(logs_containing(&mut engine, "[persist] restored exp=exp1 selector=#hero").len(), 1);

    engine.advance_time(&mut page, 4_999)?;
    page.set_style_property(hero, "color", "green", false)?;
    engine.pump(&mut page)?;
    assert_eq!(page.style_property(hero, "color"), "red");
    assert!(logs_containing(&mut engine, "[persist]").is_empty());

    engine.advance_time(&mut page, 1)?;
    page.set_style_property(hero, "color", "green", false)?;
    engine.pump(&mut page)?;
    assert_eq!(logs_containing(&mut engine, "[persist] restored").len(), 1);
    Ok(())
}

#[test]
fn removed_experiment_no_longer_defends_its_styles() -> Result<()> {
    let mut engine = DomChangesEngine::new(EngineConfig::default());
    let (mut page, hero) = styled_hero(&mut engine)?;

    engine.remove_all(&mut page, "exp1");
    assert_eq!(engine.watched_node_count(), 0);
    page.assert_attr("#hero", "style", Some("color: blue"))?;

    page.set_style_property(hero, "color", "green", false)?;
    engine.pump(&mut page)?;
    assert_eq!(page.style_property(hero, "color"), "green");
    Ok(())
}

#[test]
fn every_watching_experiment_is_replayed() -> Result<()> {
    let mut engine = DomChangesEngine::new(EngineConfig::default());
    let (mut page, hero) = styled_hero(&mut engine)?;
    let border = change(r##"{"selector": "div#hero", "type": "style", "value": {"borderWidth": "2px"}}"##)?;
    assert!(engine.apply_change(&mut page, &border, "exp2"));
    engine.pump(&mut page)?;

    page.set_attr(hero, "style", "")?;
    engine.pump(&mut page)?;
    assert_eq!(page.style_property(hero, "color"), "red");
    assert_eq!(page.style_property(hero, "border-width"), "2px");
    Ok(())
}

#[test]
fn step_limit_stops_a_runaway_pump() -> Result<()> {
    let mut engine = DomChangesEngine::new(EngineConfig::default());
    let (mut page, hero) = styled_hero(&mut engine)?;
    page.set_step_limit(1)?;

    page.set_style_property(hero, "color", "green", false)?;
    match engine.pump(&mut page) {
        Err(Error::Host(msg)) => {
            assert!(msg.contains("limit=1"), "{msg}");
            assert!(msg.contains("steps=2"), "{msg}");
        }
        other => panic!("unexpected pump result: {other:?}"),
    }
    assert!(page.set_step_limit(0).is_err());
    Ok(())
}

#[test]
fn a_later_style_change_wins_over_an_earlier_one_on_replay() -> Result<()> {
    let mut engine = DomChangesEngine::new(EngineConfig::default());
    let (mut page, hero) = styled_hero(&mut engine)?;
    let blue = change(r##"{"selector": "#hero", "type": "style", "value": {"color": "navy", "marginTop": "1px"}}"##)?;
    assert!(engine.apply_change(&mut page, &blue, "exp1"));
    assert_eq!(engine.pump(&mut page)?, 1);
    assert_eq!(page.style_property(hero, "color"), "navy");

    page.set_style_property(hero, "color", "green", false)?;
    engine.pump(&mut page)?;
    assert_eq!(page.style_property(hero, "color"), "navy");
    assert_eq!(page.style_property(hero, "margin-top"), "1px");
    Ok(())
}
