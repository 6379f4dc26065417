use super::*;
use pretty_assertions::assert_eq;

#[test]
fn cta_class_scenario_round_trips_through_remove_one() -> Result<()> {
    let mut page = page_with_body(r#"<button class="cta cold">Buy</button>"#)?;
    let cta = first(&page, ".cta")?;
    let mut engine = DomChangesEngine::new(EngineConfig::default());
    let class = change(r#"{"selector": ".cta", "type": "class", "add": ["hot"], "remove": ["cold"]}"#)?;

    assert!(engine.apply_change(&mut page, &class, "exp1"));
    assert_eq!(page.class_list(cta), vec!["cta", "hot"]);

    assert!(engine.remove_one(&mut page, "exp1", ".cta", ChangeKind::Class));
    assert_eq!(page.class_list(cta), vec!["cta", "cold"]);
    page.assert_attr(".cta", markers::EXPERIMENT, None)?;
    page.assert_attr(".cta", markers::MODIFIED, None)?;
    assert!(!engine.has_changes("exp1"));

    assert!(!engine.remove_one(&mut page, "exp1", ".cta", ChangeKind::Class));
    Ok(())
}

#[test]
fn remove_one_replays_the_remaining_changes_of_the_same_key() -> Result<()> {
    let mut page = page_with_body(r#"<button class="cta cold">Buy</button>"#)?;
    let cta = first(&page, ".cta")?;
    let mut engine = DomChangesEngine::new(EngineConfig::default());

    assert!(engine.apply_change(&mut page, &change(r#"{"selector": ".cta", "type": "class", "add": ["a"]}"#)?, "exp1"));
    assert!(engine.apply_change(&mut page, &change(r#"{"selector": ".cta", "type": "class", "add": ["b"], "remove": ["cold"]}"#)?, "exp1"));
    assert_eq!(page.class_list(cta), vec!["cta", "a", "b"]);

    assert!(engine.remove_one(&mut page, "exp1", ".cta", ChangeKind::Class));
    assert_eq!(page.class_list(cta), vec!["cta", "b"]);
    page.assert_attr(".cta", markers::EXPERIMENT, Some("exp1"))?;

    let remaining = engine.applied_changes("exp1");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].nodes, vec![cta]);
    assert_eq!(
        engine.original_state(".cta", ChangeKind::Class, cta),
        Some(&OriginalState::Class {
            classes: vec!["cta".into(), "cold".into()],
        })
    );
    Ok(())
}

#[test]
fn remove_one_keeps_the_last_applied_value() -> Result<()> {
    let mut page = page_with_body(r#"<p id="t">orig</p>"#)?;
    let mut engine = DomChangesEngine::new(EngineConfig::default());
    for value in ["A", "B", "C"] {
        let text = change(&format!(r##"{{"selector": "#t", "type": "text", "value": "{value}"}}"##))?;
        assert!(engine.apply_change(&mut page, &text, "exp1"));
    }

    assert!(engine.remove_one(&mut page, "exp1", "#t", ChangeKind::Text));
    page.assert_text("#t", "C")?;
    assert!(engine.remove_one(&mut page, "exp1", "#t", ChangeKind::Text));
    page.assert_text("#t", "C")?;
    assert!(engine.remove_one(&mut page, "exp1", "#t", ChangeKind::Text));
    page.assert_text("#t", "orig")?;
    assert!(!engine.has_changes("exp1"));
    Ok(())
}

#[test]
fn remove_one_leaves_other_kinds_alone() -> Result<()> {
    let mut page = page_with_body(r#"<p id="t" class="x">orig</p>"#)?;
    let mut engine = DomChangesEngine::new(EngineConfig::default());
    assert!(engine.apply_change(&mut page, &change(r##"{"selector": "#t", "type": "text", "value": "new"}"##)?, "exp1"));
    assert!(engine.apply_change(&mut page, &change(r##"{"selector": "#t", "type": "class", "add": ["y"]}"##)?, "exp1"));

    assert!(!engine.remove_one(&mut page, "exp1", "#t", ChangeKind::Html));
    assert!(engine.remove_one(&mut page, "exp1", "#t", ChangeKind::Class));
    page.assert_text("#t", "new")?;
    page.assert_attr("#t", "class", Some("x"))?;
    page.assert_attr("#t", markers::EXPERIMENT, Some("exp1"))?;
    Ok(())
}

#[test]
fn remove_one_inline_style_keeps_the_node_defended_while_styles_remain() -> Result<()> {
    let mut page = page_with_body(r#"<div id="s" style="color: blue">x</div>"#)?;
    let node = first(&page, "#s")?;
    let mut engine = DomChangesEngine::new(EngineConfig::default());
    assert!(engine.apply_change(&mut page, &change(r##"{"selector": "#s", "type": "style", "value": {"color": "red"}}"##)?, "exp1"));
    assert!(engine.apply_change(&mut page, &change(r##"{"selector": "#s", "type": "style", "value": {"background": "black"}}"##)?, "exp1"));

    assert!(engine.remove_one(&mut page, "exp1", "#s", ChangeKind::Style));
    assert_eq!(page.style_property(node, "color"), "blue");
    assert_eq!(page.style_property(node, "background"), "black");
    assert_eq!(engine.watched_node_count(), 1);

    assert!(engine.remove_one(&mut page, "exp1", "#s", ChangeKind::Style));
    page.assert_attr("#s", "style", Some("color: blue"))?;
    assert_eq!(engine.watched_node_count(), 0);
    Ok(())
}

#[test]
fn remove_one_replays_rule_blocks_and_drops_an_empty_sheet() -> Result<()> {
    let mut page = page_with_body(r#"<a class="btn">go</a>"#)?;
    let mut engine = DomChangesEngine::new(EngineConfig::default());
    let red = change(r#"{"selector": ".btn", "type": "styleRules", "states": {"normal": {"color": "red"}}}"#)?;
    let blue = change(r#"{"selector": ".btn", "type": "styleRules", "states": {"normal": {"color": "blue"}}}"#)?;
    assert!(engine.apply_change(&mut page, &red, "exp1"));
    assert!(engine.apply_change(&mut page, &blue, "exp1"));

    assert!(engine.remove_one(&mut page, "exp1", ".btn", ChangeKind::StyleRules));
    let css = engine.style_sheet_css("exp1").unwrap_or_default();
    assert!(css.contains("color: blue !important;"), "{css}");
    assert!(!css.contains("red"), "{css}");
    page.assert_exists("#variant-styles-exp1")?;

    assert!(engine.remove_one(&mut page, "exp1", ".btn", ChangeKind::StyleRules));
    assert_eq!(engine.style_sheet_css("exp1"), None);
    assert!(page.query_selector("#variant-styles-exp1")?.is_none());
    page.assert_attr(".btn", markers::STYLE_RULES, None)?;
    Ok(())
}

#[test]
fn remove_one_of_a_created_element_removes_only_that_element() -> Result<()> {
    let mut page = page_with_body(r#"<main id="m"></main>"#)?;
    let mut engine = DomChangesEngine::new(EngineConfig::default());
    let create = |text: &str| {
        change(&format!(
            r##"{{"selector": "", "type": "create", "element": "<p>{text}</p>", "targetSelector": "#m"}}"##
        ))
    };
    assert!(engine.apply_change(&mut page, &create("one")?, "exp1"));
    assert!(engine.apply_change(&mut page, &create("two")?, "exp1"));
    assert_eq!(page.query_selector_all("#m p")?.len(), 2);

    assert!(engine.remove_one(&mut page, "exp1", "", ChangeKind::Create));
    page.assert_text("#m", "two")?;
    assert_eq!(engine.created_element_count(), 1);
    Ok(())
}

#[test]
fn revert_one_undoes_a_single_record() -> Result<()> {
    let mut page = page_with_body(r#"<p id="t">orig</p><div id="s">x</div>"#)?;
    let mut engine = DomChangesEngine::new(EngineConfig::default());
    assert!(engine.apply_change(&mut page, &change(r##"{"selector": "#t", "type": "text", "value": "new"}"##)?, "exp1"));
    assert!(engine.apply_change(&mut page, &change(r##"{"selector": "#s", "type": "style", "value": {"color": "red"}}"##)?, "exp1"));
    assert_eq!(engine.watched_node_count(), 1);

    let text_record = engine.applied_changes("exp1")[0].clone();
    assert!(engine.revert_one(&mut page, &text_record));
    page.assert_text("#t", "orig")?;
    page.assert_attr("#t", markers::EXPERIMENT, None)?;
    page.assert_attr("#s", "style", Some("color: red;"))?;
    assert!(!engine.revert_one(&mut page, &text_record));

    let style_record = engine.applied_changes("exp1")[0].clone();
    assert!(engine.revert_one(&mut page, &style_record));
    page.assert_attr("#s", "style", None)?;
    assert_eq!(engine.watched_node_count(), 0);
    assert!(!engine.has_changes("exp1"));
    Ok(())
}

#[test]
fn revert_one_skips_nodes_that_left_the_page() -> Result<()> {
    let mut page = page_with_body(r#"<i class="item">a</i><i class="item" id="gone">b</i>"#)?;
    let gone = first(&page, "#gone")?;
    let mut engine = traced_engine();
    assert!(engine.apply_change(&mut page, &change(r#"{"selector": ".item", "type": "class", "add": ["on"]}"#)?, "exp1"));
    assert_eq!(page.query_selector_all(".item.on")?.len(), 2);

    page.remove_node(gone)?;
    let record = engine.applied_changes("exp1")[0].clone();
    assert!(engine.revert_one(&mut page, &record));
    assert!(page.query_selector_all(".item.on")?.is_empty());
    assert_eq!(page.class_list(gone), vec!["item", "on"]);
    assert_eq!(logs_containing(&mut engine, "skip detached").len(), 1);
    Ok(())
}

#[test]
fn descendant_changes_revert_after_an_ancestor_markup_restore() -> Result<()> {
    let mut page = page_with_body(r#"<p id="t">Hi <b class="k">w</b></p>"#)?;
    let before = page.html();
    let mut engine = traced_engine();

    assert!(engine.apply_change(&mut page, &change(r##"{"selector": "#t b", "type": "class", "add": ["hot"]}"##)?, "exp1"));
    assert!(engine.apply_change(&mut page, &change(r##"{"selector": "#t", "type": "text", "value": "Bye"}"##)?, "exp2"));
    assert!(page.query_selector("#t b")?.is_none());

    engine.remove_all(&mut page, "exp2");
    let recreated = first(&page, "#t b")?;
    assert_eq!(page.class_list(recreated), vec!["k", "hot"]);

    engine.remove_all(&mut page, "exp1");
    assert_eq!(page.html(), before);
    assert_eq!(engine.baseline_count(), 0);
    assert_eq!(logs_containing(&mut engine, "[remove] detached node=").len(), 1);
    Ok(())
}

#[test]
fn revert_one_follows_a_recreated_descendant() -> Result<()> {
    let mut page = page_with_body(r#"<div id="card"><span class="tag" title="a">x</span></div>"#)?;
    let before = page.html();
    let mut engine = DomChangesEngine::new(EngineConfig::default());

    let attr = change(r#"{"selector": ".tag", "type": "attribute", "value": {"title": "b"}}"#)?;
    assert!(engine.apply_change(&mut page, &attr, "exp1"));
    assert!(engine.apply_change(&mut page, &change(r##"{"selector": "#card", "type": "html", "value": "<em>y</em>"}"##)?, "exp2"));
    engine.remove_all(&mut page, "exp2");
    page.assert_attr(".tag", "title", Some("b"))?;

    let record = engine.applied_changes("exp1")[0].clone();
    assert!(engine.revert_one(&mut page, &record));
    assert_eq!(page.html(), before);
    Ok(())
}
