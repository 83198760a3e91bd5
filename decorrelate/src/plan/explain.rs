use std::borrow::Cow;
use std::io::{BufWriter, Write};

use ptree::print_config::UTF_CHARS;
use ptree::{write_tree_with, PrintConfig, Style, TreeItem};

use crate::plan::Select;
use crate::table::Table;

/// One line of the rendered tree: a select or one of its FROM-list entries.
#[derive(Clone)]
enum ExplainNode<'a> {
    Select(&'a Select),
    Table(&'a Table),
}

fn node_for(table: &Table) -> ExplainNode<'_> {
    match table {
        Table::Derived(derived) => ExplainNode::Select(derived.select()),
        other => ExplainNode::Table(other),
    }
}

impl<'a> TreeItem for ExplainNode<'a> {
    type Child = ExplainNode<'a>;

    fn write_self<W: Write>(&self, f: &mut W, style: &Style) -> std::io::Result<()> {
        match self {
            ExplainNode::Select(select) => write!(f, "{}", style.paint(select)),
            ExplainNode::Table(table) => write!(f, "{}", style.paint(table)),
        }
    }

    fn children(&self) -> Cow<[Self::Child]> {
        let children = match self {
            ExplainNode::Select(select) => {
                select.tables().iter().map(node_for).collect()
            }
            ExplainNode::Table(Table::Join(join)) => vec![node_for(join.table())],
            ExplainNode::Table(Table::Apply(apply)) => vec![node_for(apply.table())],
            ExplainNode::Table(_) => vec![],
        };
        Cow::from(children)
    }
}

pub fn explain<W: Write>(plan: &Select, output: &mut W) -> std::io::Result<()> {
    let config = PrintConfig {
        indent: 3,
        characters: UTF_CHARS.into(),
        ..Default::default()
    };
    write_tree_with(&ExplainNode::Select(plan), output, &config)
}

pub fn explain_to_string(plan: &Select) -> std::io::Result<String> {
    let mut buf = BufWriter::new(Vec::new());

    explain(plan, &mut buf)?;

    let bytes = buf.into_inner()?;
    Ok(String::from_utf8(bytes).unwrap())
}

#[cfg(test)]
mod tests {
    use super::explain_to_string;
    use crate::expr::{col, eq, ScalarType};
    use crate::plan::SelectBuilder;
    use crate::table::JoinKind;

    #[test]
    fn test_explain_join_over_derived() {
        let inner = SelectBuilder::new("s")
            .base("orders", "o")
            .project(col("o", "cust", ScalarType::Int), "cust")
            .build();
        let plan = SelectBuilder::new("q")
            .base("customers", "c")
            .join_derived(
                JoinKind::Left,
                inner,
                Some(eq(
                    col("c", "id", ScalarType::Int),
                    col("s", "cust", ScalarType::Int),
                )),
            )
            .project(col("c", "id", ScalarType::Int), "id")
            .build();

        let expected_result = "\
Select { alias: \"q\", projections: [c.id AS id] }
├─ Base { name: \"customers\", alias: \"c\" }
└─ Join { kind: Left, condition: c.id = s.cust }
   └─ Select { alias: \"s\", projections: [o.cust AS cust] }
      └─ Base { name: \"orders\", alias: \"o\" }
";

        let result = explain_to_string(&plan).unwrap();
        assert_eq!(expected_result, result);
    }
}
