//! Mapping between Arrow schemas and trees.
use arrow_schema::{DataType, Field, Schema};

use treedraw_core::TreeInfo;

use crate::errors::ParquetTreeError;

/// Returns whether values of `data_type` can be widened to `f64`.
pub(crate) fn is_branch_type(data_type: &DataType) -> bool {
    data_type.is_numeric() || matches!(data_type, DataType::Boolean)
}

/// Lists every top-level struct column as a tree with its numeric children.
pub(crate) fn discover_trees(schema: &Schema) -> Vec<TreeInfo> {
    schema
        .fields()
        .iter()
        .filter_map(|field| match field.data_type() {
            DataType::Struct(children) => Some(TreeInfo::new(
                field.name().clone(),
                children
                    .iter()
                    .filter(|child| is_branch_type(child.data_type()))
                    .map(|child| child.name().clone()),
            )),
            _ => None,
        })
        .collect()
}

/// Locates the struct column for `tree` and checks that every branch is
/// readable. Returns the root column index.
pub(crate) fn resolve_tree(
    schema: &Schema,
    tree: &str,
    branches: &[String],
) -> Result<usize, ParquetTreeError> {
    let index = schema
        .index_of(tree)
        .map_err(|_| ParquetTreeError::TreeNotFound {
            tree: tree.to_owned(),
        })?;
    let field: &Field = schema.field(index);
    let DataType::Struct(children) = field.data_type() else {
        return Err(ParquetTreeError::NotATree {
            column: tree.to_owned(),
            actual: field.data_type().clone(),
        });
    };
    for branch in branches {
        let (_, child) =
            children
                .find(branch)
                .ok_or_else(|| ParquetTreeError::BranchNotFound {
                    tree: tree.to_owned(),
                    branch: branch.clone(),
                })?;
        if !is_branch_type(child.data_type()) {
            return Err(ParquetTreeError::UnsupportedBranchType {
                tree: tree.to_owned(),
                branch: branch.clone(),
                actual: child.data_type().clone(),
            });
        }
    }
    Ok(index)
}
