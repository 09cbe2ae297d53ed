//! Script text analysis: tokenizing, migration units, DDL dumps,
//! normalization, parameters and test queries

mod ddl;
mod migration;
mod normalize;
mod parameters;
mod test_query;
mod tokenizer;

pub use ddl::{classify_statement, split_batch_ddl, split_statements};
pub use migration::split_migration_units;
pub use normalize::{normalize_body, normalize_for_comparison, scripts_equivalent};
pub use parameters::ParameterInjector;
pub use test_query::{generate_test_query, parse_test_ctes, MockTable, ACTUAL_DATA, EXPECTED_DATA};
pub use tokenizer::{
    clean_sql, find_qualified_occurrences, first_qualified_occurrence, occurrences_in_clean,
    qualified_occurrences, strip_comments, strip_string_literals, QualifiedName,
};
