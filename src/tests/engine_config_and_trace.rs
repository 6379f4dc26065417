use super::*;
use pretty_assertions::assert_eq;

#[test]
fn config_defaults() {
    let config = EngineConfig::default();
    assert!(!config.debug);
    assert!(!config.spa_mode);
    assert_eq!(config.persistence_log_window_ms, 5_000);
    assert_eq!(config.style_sheet_id_prefix, "variant-styles-");
    assert_eq!(config.trace_log_limit, 10_000);
    assert_eq!(config.max_pending_retries, 3);
    assert_eq!(config.validate(), Ok(()));
}

#[test]
fn config_reads_camel_case_json_and_fills_defaults() -> Result<()> {
    let config = EngineConfig::from_json(
        r#"{"debug": true, "spaMode": true, "persistenceLogWindowMs": 250, "maxPendingRetries": 1}"#,
    )?;
    assert_eq!(
        config,
        EngineConfig {
            debug: true,
            spa_mode: true,
            persistence_log_window_ms: 250,
            max_pending_retries: 1,
            ..EngineConfig::default()
        }
    );
    assert_eq!(EngineConfig::from_json("{}")?, EngineConfig::default());
    Ok(())
}

#[test]
fn invalid_config_is_rejected() {
    let cases = [
        r#"{"persistenceLogWindowMs": -1}"#,
        r#"{"styleSheetIdPrefix": "bad prefix"}"#,
        r#"{"styleSheetIdPrefix": ""}"#,
        r#"{"traceLogLimit": 0}"#,
    ];
    for json in cases {
        match EngineConfig::from_json(json) {
            Err(Error::InvalidConfig(_)) => {}
            other => panic!("expected InvalidConfig for {json}, got {other:?}"),
        }
    }
    assert!(matches!(
        EngineConfig::from_json(r#"{"debug": "yes"}"#),
        Err(Error::Json(_))
    ));
}

#[test]
fn trace_is_only_collected_when_enabled() -> Result<()> {
    let mut page = page_with_body("<p>x</p>")?;
    let mut engine = DomChangesEngine::new(EngineConfig::default());
    let miss = change(r#"{"selector": ".nope", "type": "text", "value": "y"}"#)?;

    assert!(!engine.apply_change(&mut page, &miss, "exp1"));
    assert!(engine.take_trace_logs().is_empty());

    engine.set_trace(true);
    assert!(!engine.apply_change(&mut page, &miss, "exp1"));
    assert_eq!(
        engine.take_trace_logs(),
        vec!["[apply] miss exp=exp1 selector=.nope kind=text".to_string()]
    );
    assert!(engine.take_trace_logs().is_empty());
    Ok(())
}

#[test]
fn trace_buffer_keeps_the_newest_lines() -> Result<()> {
    let mut page = page_with_body("<p>x</p>")?;
    let mut engine = traced_engine();
    assert!(engine.set_trace_log_limit(0).is_err());
    engine.set_trace_log_limit(2)?;

    for selector in [".a", ".b", ".c"] {
        let miss = DomChange::new(selector, ChangeAction::Text("y".into()));
        engine.apply_change(&mut page, &miss, "exp1");
    }
    let logs = engine.take_trace_logs();
    assert_eq!(logs.len(), 2);
    assert!(logs[0].contains("selector=.b"), "{logs:?}");
    assert!(logs[1].contains("selector=.c"), "{logs:?}");
    Ok(())
}

#[test]
fn clock_only_moves_forward() -> Result<()> {
    let mut page = page_with_body("<p>x</p>")?;
    let mut engine = DomChangesEngine::new(EngineConfig::default());
    assert_eq!(engine.advance_time(&mut page, 40)?, 0);
    assert_eq!(page.now_ms(), 40);
    assert!(matches!(
        engine.advance_time(&mut page, -1),
        Err(Error::Host(_))
    ));
    assert_eq!(page.now_ms(), 40);
    Ok(())
}

#[test]
fn applied_records_carry_the_page_clock() -> Result<()> {
    let mut page = page_with_body(r#"<p id="t">x</p>"#)?;
    let mut engine = DomChangesEngine::new(EngineConfig::default());
    engine.advance_time(&mut page, 120)?;
    assert!(engine.apply_change(&mut page, &change(r##"{"selector": "#t", "type": "text", "value": "y"}"##)?, "exp1"));

    let record = &engine.applied_changes("exp1")[0];
    assert_eq!(record.experiment_id, "exp1");
    assert_eq!(record.applied_at, 120);
    Ok(())
}

#[test]
fn scripts_run_through_the_supplied_runner() -> Result<()> {
    let mut page = page_with_body(r#"<a class="cta">a</a><a class="cta">b</a>"#)?;
    let scripts = ScriptRegistry::new().with("track()", |page: &mut Page, node: NodeId| {
        page.set_attr(node, "data-tracked", "1")
    });
    assert_eq!(scripts.len(), 1);
    let mut engine = DomChangesEngine::with_script_runner(EngineConfig::default(), scripts);
    let script = change(r#"{"selector": ".cta", "type": "javascript", "value": "  track()  "}"#)?;

    assert!(engine.apply_change(&mut page, &script, "exp1"));
    assert_eq!(page.query_selector_all(r#".cta[data-tracked="1"]"#)?.len(), 2);
    assert_eq!(engine.applied_changes("exp1")[0].nodes.len(), 2);
    Ok(())
}

#[test]
fn reset_removes_every_experiment_and_keeps_the_engine_usable() -> Result<()> {
    let mut page = page_with_body(r#"<p id="t">x</p><div class="btn">b</div><div id="app"></div>"#)?;
    let before = page.html();
    let mut engine = traced_engine();
    assert!(engine.apply_change(&mut page, &change(r##"{"selector": "#t", "type": "text", "value": "y"}"##)?, "exp1"));
    assert!(engine.apply_change(&mut page, &change(r#"{"selector": ".btn", "type": "styleRules", "states": {"normal": {"color": "red"}}}"#)?, "exp2"));
    assert!(engine.apply_change(&mut page, &change(r#"{"selector": ".late", "type": "text", "value": "z", "waitForElement": true}"#)?, "exp3"));
    assert_eq!(engine.experiments(), vec!["exp1".to_string(), "exp2".to_string()]);
    engine.take_trace_logs();

    engine.reset(&mut page);
    assert_eq!(page.html(), before);
    assert!(engine.experiments().is_empty());
    assert!(engine.pending_changes("exp3").is_empty());
    assert_eq!(engine.pending_subscription_count(), 0);
    assert_eq!(logs_containing(&mut engine, "[remove] reset experiments=3").len(), 1);

    assert!(engine.apply_change(&mut page, &change(r##"{"selector": "#t", "type": "text", "value": "again"}"##)?, "exp1"));
    page.assert_text("#t", "again")?;
    Ok(())
}

#[test]
fn dispose_drops_all_bookkeeping() -> Result<()> {
    let mut page = page_with_body(r#"<p id="t" style="color: blue">x</p><main id="m"></main>"#)?;
    let before = page.html();
    let mut engine = DomChangesEngine::new(EngineConfig::default());
    assert!(engine.apply_change(&mut page, &change(r##"{"selector": "#t", "type": "style", "value": {"color": "red"}}"##)?, "exp1"));
    assert!(engine.apply_change(&mut page, &change(r##"{"selector": "", "type": "create", "element": "<b>new</b>", "targetSelector": "#m"}"##)?, "exp1"));
    assert_eq!(engine.watched_node_count(), 1);
    assert_eq!(engine.created_element_count(), 1);

    engine.dispose(&mut page);
    assert_eq!(page.html(), before);
    assert_eq!(engine.baseline_count(), 0);
    assert_eq!(engine.watched_node_count(), 0);
    assert_eq!(engine.created_element_count(), 0);
    assert!(!engine.has_changes("exp1"));
    Ok(())
}
