use super::*;
use pretty_assertions::assert_eq;

#[test]
fn parses_fragment_and_serializes_with_sorted_attributes() -> Result<()> {
    let page = Page::from_html(
        r#"<div id="a" class="x" data-k='v'>Hi &amp; <br>bye<input disabled></div><!-- gone -->"#,
    )?;
    assert_eq!(
        page.html(),
        r#"<div class="x" data-k="v" id="a">Hi &amp; <br>bye<input disabled=""></div>"#
    );
    let div = first(&page, "#a")?;
    assert_eq!(page.text(div), "Hi & bye");
    assert_eq!(page.attr(div, "DATA-K").as_deref(), Some("v"));
    Ok(())
}

#[test]
fn optional_end_tags_close_list_items_and_paragraphs() -> Result<()> {
    let page = Page::from_html("<ul><li>a<li>b</ul><p>one<p>two<div>three</div>")?;
    assert_eq!(page.query_selector_all("li")?.len(), 2);
    assert_eq!(page.query_selector_all("p")?.len(), 2);
    assert!(page.query_selector_all("p div")?.is_empty());
    assert_eq!(page.query_selector_all("p + div")?.len(), 1);
    Ok(())
}

#[test]
fn raw_text_elements_keep_markup_verbatim() -> Result<()> {
    let page = page_with_body("<style>.a > b { color: red }</style><p>x</p>")?;
    let style = first(&page, "style")?;
    assert_eq!(page.text(style), ".a > b { color: red }");
    assert_eq!(page.inner_html(style)?, ".a > b { color: red }");
    Ok(())
}

#[test]
fn unclosed_comment_is_a_parse_error() {
    let err = Page::from_html("<div><!-- open").expect_err("comment is unclosed");
    assert!(matches!(err, Error::HtmlParse(_)));
}

#[test]
fn selector_engine_covers_combinators_and_structural_pseudos() -> Result<()> {
    let page = page_with_body(
        r#"<ul id="list"><li class="a">1</li><li class="b" data-role="main item">2</li><li class="a c">3</li></ul><p lang="en-US">x</p><p></p>"#,
    )?;

    assert_eq!(page.query_selector_all("#list > li")?.len(), 3);
    assert_eq!(page.query_selector_all("body li.a")?.len(), 2);
    assert_eq!(page.query_selector_all("li.a + li")?.len(), 1);
    assert_eq!(page.query_selector_all("li.b ~ li")?.len(), 1);
    assert_eq!(page.query_selector_all("li:nth-child(odd)")?.len(), 2);
    assert_eq!(page.query_selector_all("li:not(.a)")?.len(), 1);
    assert_eq!(page.query_selector_all("li:first-child, li:last-child")?.len(), 2);
    assert_eq!(page.query_selector_all("[data-role~=item]")?.len(), 1);
    assert_eq!(page.query_selector_all("[data-role^=main]")?.len(), 1);
    assert_eq!(page.query_selector_all("[lang|=en]")?.len(), 1);
    assert_eq!(page.query_selector_all("p:empty")?.len(), 1);
    assert_eq!(page.query_selector_all("ul:has(.c)")?.len(), 1);
    assert_eq!(page.query_selector_all("li:is(.b, .c)")?.len(), 2);
    Ok(())
}

#[test]
fn compiled_selector_lists_cover_nth_formulas_and_quoted_values() -> Result<()> {
    let page = page_with_body(
        r#"<ol><li>1</li><li>2</li><li>3</li><li>4</li><li>5</li></ol><p title="a]b">q</p>"#,
    )?;
    let list = SelectorList::parse("li:nth-child(3n+1), li:nth-last-child(2)")?;
    let picked = page
        .query_selector_all("li")?
        .into_iter()
        .filter(|li| page.dom.matches_list(*li, &list))
        .map(|li| page.text(li))
        .collect::<Vec<_>>();
    assert_eq!(picked, vec!["1", "4"]);
    assert_eq!(page.query_selector_all("li:nth-child(-n+2)")?.len(), 2);
    assert_eq!(page.query_selector_all("li:nth-of-type(even)")?.len(), 2);
    assert_eq!(page.query_selector_all(r#"p[title="a]b"]"#)?.len(), 1);

    assert_eq!(SelectorList::parse("#x")?.single_id(), Some("x"));
    assert_eq!(SelectorList::parse("div#x")?.single_id(), None);
    for bad in ["li:nth-child(0)", "li:nth-child(+n)", "a,,b", "> a", "a >", "[x", "a:unknown"] {
        assert!(
            matches!(SelectorList::parse(bad), Err(Error::UnsupportedSelector(_))),
            "{bad}"
        );
    }
    Ok(())
}

#[test]
fn dynamic_pseudo_classes_never_match_static_queries() -> Result<()> {
    let page = page_with_body(r#"<a class="btn" href="/x">go</a>"#)?;
    assert!(page.query_selector_all(".btn:hover")?.is_empty());
    assert!(page.query_selector_all(".btn:focus")?.is_empty());
    assert_eq!(page.query_selector_all(".btn")?.len(), 1);
    Ok(())
}

#[test]
fn unsupported_selector_syntax_is_reported() {
    let page = page_with_body("<p>x</p>").expect("page parses");
    let err = page
        .query_selector_all("p::after")
        .expect_err("pseudo-elements are not supported");
    assert!(matches!(err, Error::UnsupportedSelector(_)));
}

#[test]
fn base_selector_strips_pseudo_classes() {
    assert_eq!(base_selector(".btn:hover"), ".btn");
    assert_eq!(base_selector("a.link:focus, .card:active"), "a.link, .card");
    assert_eq!(base_selector("#plain"), "#plain");
}

#[test]
fn css_path_resolves_back_to_the_same_node() -> Result<()> {
    let page = page_with_body(
        r#"<section><div><span>a</span><span>b</span></div></section><div id="anchor"><em>c</em></div>"#,
    )?;
    for selector in ["section span:last-child", "#anchor em", "section"] {
        let node = first(&page, selector)?;
        let path = page.dom.css_path(node).expect("element has a path");
        assert_eq!(page.query_selector(&path)?, Some(node), "path {path}");
    }
    let em = first(&page, "#anchor em")?;
    assert_eq!(page.dom.css_path(em).as_deref(), Some("#anchor > em:nth-child(1)"));
    Ok(())
}

#[test]
fn tree_mutations_queue_records_and_keep_id_index() -> Result<()> {
    let mut page = page_with_body(r#"<div id="host"></div>"#)?;
    assert!(!page.has_mutation_records());

    let host = first(&page, "#host")?;
    let added = page.append_html(host, r#"<p id="late">x</p>"#)?;
    assert_eq!(added.len(), 1);
    assert_eq!(first(&page, "#late")?, added[0]);

    page.set_attr(added[0], "id", "renamed")?;
    assert!(page.query_selector("#late")?.is_none());
    assert_eq!(first(&page, "#renamed")?, added[0]);

    let records = page.take_mutation_records();
    assert_eq!(records.len(), 2);
    assert!(matches!(
        &records[0].kind,
        MutationKind::ChildList { added, .. } if added.len() == 1
    ));
    assert!(matches!(
        &records[1].kind,
        MutationKind::Attributes { name, old_value } if name == "id" && old_value.as_deref() == Some("late")
    ));
    assert!(!page.has_mutation_records());
    Ok(())
}

#[test]
fn insertion_rejects_cycles_and_detached_nodes_are_disconnected() -> Result<()> {
    let mut page = page_with_body(r#"<div id="outer"><div id="inner"></div></div>"#)?;
    let outer = first(&page, "#outer")?;
    let inner = first(&page, "#inner")?;

    let err = page
        .dom
        .append_child(inner, outer)
        .expect_err("cannot insert an ancestor into its descendant");
    assert!(matches!(err, Error::Host(_)));

    page.remove_node(inner)?;
    assert!(!page.is_connected(inner));
    assert!(page.query_selector("#inner")?.is_none());
    // Removing a detached node is a no-op.
    page.remove_node(inner)?;
    Ok(())
}

#[test]
fn inline_style_helpers_track_value_and_priority() -> Result<()> {
    let mut page = page_with_body(r#"<div id="s" style="color: blue; margin: 0"></div>"#)?;
    let node = first(&page, "#s")?;
    page.set_style_property(node, "backgroundColor", "red", true)?;
    assert_eq!(page.style_property(node, "background-color"), "red");
    assert!(page.style_priority(node, "backgroundColor"));
    assert_eq!(
        page.attr(node, "style").as_deref(),
        Some("color: blue; margin: 0; background-color: red !important;")
    );

    page.set_style_property(node, "color", "", false)?;
    assert_eq!(page.style_property(node, "color"), "");
    Ok(())
}

#[test]
fn class_helpers_keep_an_emptied_class_attribute() -> Result<()> {
    let mut page = page_with_body(r#"<p id="c" class="one">x</p>"#)?;
    let node = first(&page, "#c")?;
    page.add_class(node, "two")?;
    page.add_class(node, "two")?;
    assert_eq!(page.class_list(node), vec!["one", "two"]);
    assert!(page.has_class(node, "two"));

    page.remove_class(node, "one")?;
    page.remove_class(node, "two")?;
    assert_eq!(page.attr(node, "class").as_deref(), Some(""));
    Ok(())
}

#[test]
fn assertions_report_snippets() -> Result<()> {
    let page = page_with_body(r#"<p id="msg" data-state="on">hello</p>"#)?;
    page.assert_text("#msg", "hello")?;
    page.assert_attr("#msg", "data-state", Some("on"))?;
    page.assert_attr("#msg", "hidden", None)?;

    match page.assert_text("#msg", "bye") {
        Err(Error::AssertionFailed {
            expected,
            actual,
            dom_snippet,
            ..
        }) => {
            assert_eq!(expected, "bye");
            assert_eq!(actual, "hello");
            assert!(dom_snippet.contains("data-state=\"on\""));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(matches!(
        page.assert_exists("#missing"),
        Err(Error::SelectorNotFound(_))
    ));
    Ok(())
}

#[test]
fn text_replacement_escapes_on_dump() -> Result<()> {
    let mut page = page_with_body(r#"<p title="t" id="msg" data-state="on">hi <b>there</b></p>"#)?;
    let msg = first(&page, "#msg")?;
    assert_eq!(page.attr_names(msg), vec!["data-state", "id", "title"]);

    page.set_text(msg, "a < b")?;
    assert_eq!(
        page.dump_dom("#msg")?,
        r#"<p data-state="on" id="msg" title="t">a &lt; b</p>"#
    );
    assert!(page.query_selector("#msg b")?.is_none());
    Ok(())
}

#[test]
fn head_is_created_when_the_document_has_none() -> Result<()> {
    let mut page = Page::from_html("<p>x</p>")?;
    let head = page.dom.ensure_head_element()?;
    assert_eq!(page.tag_name(head), Some("head"));
    assert_eq!(page.dom.ensure_head_element()?, head);
    assert_eq!(first(&page, "html > head")?, head);
    Ok(())
}
