//! Flattening of comparison trees into path-addressed leaves, and the reverse
//! re-nesting of leaves into a path hierarchy.

use crate::compare::CompareScope;
use crate::model::ComparisonOutcome;
use crate::path::{PathSegment, parse_path};
use crate::value::FieldValue;

#[derive(Debug, Clone)]
pub struct ComparedTree {
    pub root: ComparisonOutcome,
    pub flattened: Vec<ComparisonOutcome>,
}

impl ComparedTree {
    pub fn build(scope: &CompareScope<'_>, expected: &FieldValue, actual: &FieldValue) -> Self {
        let root = scope.compare_root(expected, actual);
        let flattened = flatten(&root);
        Self { root, flattened }
    }

    pub fn attributes(&self) -> &[ComparisonOutcome] {
        &self.root.field_comparison_details
    }
}

/// Depth-first leaves in schema order. A root without children yields nothing.
pub fn flatten(root: &ComparisonOutcome) -> Vec<ComparisonOutcome> {
    let mut leaves = Vec::<ComparisonOutcome>::new();
    if root.is_leaf() && root.path.is_empty() {
        return leaves;
    }
    collect_leaves(root, &mut leaves);
    leaves
}

fn collect_leaves(outcome: &ComparisonOutcome, leaves: &mut Vec<ComparisonOutcome>) {
    if outcome.is_leaf() {
        leaves.push(outcome.clone());
        return;
    }
    for detail in &outcome.field_comparison_details {
        collect_leaves(detail, leaves);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathTree {
    pub segment: Option<PathSegment>,
    pub path: String,
    pub outcome: Option<ComparisonOutcome>,
    pub children: Vec<PathTree>,
}

impl PathTree {
    fn empty(segment: Option<PathSegment>, path: String) -> Self {
        Self {
            segment,
            path,
            outcome: None,
            children: Vec::new(),
        }
    }

    /// Rebuilds the hierarchy implied by the leaves' paths. Children keep the
    /// order in which their first leaf appears.
    pub fn renest(leaves: &[ComparisonOutcome]) -> Result<Self, String> {
        let mut root = Self::empty(None, String::new());
        for leaf in leaves {
            let segments = parse_path(&leaf.path)?;
            if segments.is_empty() {
                return Err("leaf outcome has an empty path".to_string());
            }

            let mut node = &mut root;
            let mut prefix = Vec::<PathSegment>::with_capacity(segments.len());
            for segment in segments {
                prefix.push(segment.clone());
                let position = match node
                    .children
                    .iter()
                    .position(|child| child.segment.as_ref() == Some(&segment))
                {
                    Some(position) => position,
                    None => {
                        node.children
                            .push(Self::empty(Some(segment), crate::path::render_path(&prefix)));
                        node.children.len() - 1
                    }
                };
                node = &mut node.children[position];
            }

            if node.outcome.is_some() || !node.children.is_empty() {
                return Err(format!("path `{}` appears more than once", leaf.path));
            }
            node.outcome = Some(leaf.clone());
        }
        Ok(root)
    }

    pub fn leaves(&self) -> Vec<&ComparisonOutcome> {
        if self.children.is_empty() {
            return self.outcome.iter().collect();
        }
        self.children.iter().flat_map(PathTree::leaves).collect()
    }

    pub fn find(&self, path: &str) -> Option<&PathTree> {
        if self.path == path {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(path))
    }
}

#[cfg(test)]
impl PathTree {
    pub fn from_outcome(root: &ComparisonOutcome) -> Result<Self, String> {
        let mut tree = Self::empty(None, String::new());
        for detail in &root.field_comparison_details {
            tree.children.push(Self::mirror(detail)?);
        }
        Ok(tree)
    }

    fn mirror(outcome: &ComparisonOutcome) -> Result<Self, String> {
        let segment = parse_path(&outcome.path)?.pop();
        let mut node = Self::empty(segment, outcome.path.clone());
        let mut own = outcome.clone();
        own.field_comparison_details = Vec::new();
        node.outcome = Some(own);
        for detail in &outcome.field_comparison_details {
            node.children.push(Self::mirror(detail)?);
        }
        Ok(node)
    }

    pub fn paths(&self) -> Vec<String> {
        let mut out = Vec::<String>::new();
        for child in &self.children {
            child.collect_paths(&mut out);
        }
        out
    }

    fn collect_paths(&self, out: &mut Vec<String>) {
        out.push(self.path.clone());
        for child in &self.children {
            child.collect_paths(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ComparedTree, PathTree, flatten};
    use crate::compare::{ComparatorRegistry, CompareScope};
    use crate::path::PathSegment;
    use crate::schema::parse_document_schema;
    use crate::value::FieldValue;
    use serde_json::json;

    fn statement_tree() -> ComparedTree {
        let schema = parse_document_schema(&json!({
            "document_class": "BankStatement",
            "properties": {
                "Account": {
                    "type": "object",
                    "properties": {
                        "Holder": {"type": "string", "comparison_method": "FUZZY"},
                        "Ref.No": {"type": "string"}
                    }
                },
                "Field": {
                    "type": "array",
                    "items": {"type": "object", "properties": {"Sub": {"type": "string"}}}
                },
                "Total": {"type": "number"}
            }
        }))
        .expect("schema should load");
        let registry = ComparatorRegistry::default();
        let scope = CompareScope::new(&schema, &registry);
        ComparedTree::build(
            &scope,
            &FieldValue::from(json!({
                "Account": {"Holder": "Jane Roe", "Ref.No": "A-1"},
                "Field": [{"Sub": "x"}, {"Sub": "y"}],
                "Total": 12.5
            })),
            &FieldValue::from(json!({
                "Account": {"Holder": "Jane Roe", "Ref.No": "A-2"},
                "Field": [{"Sub": "y"}, {"Sub": "z"}, {"Sub": "x"}],
                "Total": 12.5
            })),
        )
    }

    #[test]
    fn flattening_keeps_schema_order_and_list_paths() {
        let tree = statement_tree();
        let paths = tree
            .flattened
            .iter()
            .map(|outcome| outcome.path.as_str())
            .collect::<Vec<&str>>();
        assert_eq!(
            paths,
            vec![
                "Account.Holder",
                "Account.Ref\\.No",
                "Field[0].Sub",
                "Field[1].Sub",
                "Field[2]",
                "Total",
            ]
        );
        assert!(tree.flattened.iter().all(|outcome| outcome.is_leaf()));
        assert_eq!(tree.attributes().len(), 3);
    }

    #[test]
    fn renesting_flattened_leaves_reproduces_the_hierarchy() {
        let tree = statement_tree();
        let original = PathTree::from_outcome(&tree.root).expect("paths should parse");
        let rebuilt = PathTree::renest(&tree.flattened).expect("leaves should renest");

        assert_eq!(rebuilt.paths(), original.paths());
        let original_leaves = original.leaves();
        let rebuilt_leaves = rebuilt.leaves();
        assert_eq!(rebuilt_leaves, original_leaves);

        let list_item = rebuilt.find("Field[0]").expect("list item node should exist");
        assert_eq!(list_item.segment, Some(PathSegment::Index(0)));
        assert_eq!(list_item.children[0].path, "Field[0].Sub");

        let escaped = rebuilt.find("Account.Ref\\.No").expect("escaped key node should exist");
        assert_eq!(escaped.segment, Some(PathSegment::Key("Ref.No".to_string())));
    }

    #[test]
    fn renest_rejects_duplicate_paths() {
        let tree = statement_tree();
        let mut leaves = tree.flattened.clone();
        leaves.push(leaves[0].clone());
        assert!(PathTree::renest(&leaves).is_err());
    }

    #[test]
    fn root_without_fields_flattens_to_nothing() {
        let schema = parse_document_schema(&json!({"document_class": "Blank", "properties": {}}))
            .expect("schema should load");
        let registry = ComparatorRegistry::default();
        let scope = CompareScope::new(&schema, &registry);
        let root = scope.compare_root(&FieldValue::Null, &FieldValue::Null);
        assert!(flatten(&root).is_empty());
    }
}
