use super::html::{is_void_tag, parse_html};
use super::*;

mod attr_tree_mutation;
mod connectivity_tree_traversal;
mod core_nodes_identity;
mod dump_misc;
mod selector_matching_pseudo;
mod style_class_props;
mod text_html_content;
