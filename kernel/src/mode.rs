//! Save modes and the decision table that maps a save mode and the table's current state to an
//! action.

use strum::{AsRefStr, Display as StrumDisplay, EnumString};

/// What a write does when the table already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, EnumString, StrumDisplay, AsRefStr)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SaveMode {
    /// Fail if the table exists.
    #[strum(to_string = "error_if_exists", serialize = "error", serialize = "errorifexists")]
    ErrorIfExists,
    /// Do nothing if the table exists.
    Ignore,
    /// Replace the table if it exists.
    Overwrite,
    /// Add to the table if it exists.
    #[default]
    Append,
}

/// Whether table metadata is present at the base path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableExistence {
    NotExists,
    Exists,
}

impl From<bool> for TableExistence {
    fn from(exists: bool) -> Self {
        if exists {
            Self::Exists
        } else {
            Self::NotExists
        }
    }
}

/// The outcome of [`resolve_mode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeAction {
    /// Fail the call before any mutation.
    Abort,
    /// Return without writing.
    Skip,
    /// Remove everything under the base path, then initialize fresh table metadata.
    DeleteAndInitialize,
    /// Initialize table metadata, then write.
    Initialize,
    /// Write into the existing table.
    Proceed,
}

/// The decision table:
///
/// | mode            | exists                | not exists   |
/// |-----------------|-----------------------|--------------|
/// | ErrorIfExists   | Abort                 | Initialize   |
/// | Ignore          | Skip                  | Initialize   |
/// | Overwrite       | DeleteAndInitialize   | Initialize   |
/// | Append          | Proceed               | Initialize   |
pub fn resolve_mode(mode: SaveMode, existence: TableExistence) -> ModeAction {
    match (mode, existence) {
        (_, TableExistence::NotExists) => ModeAction::Initialize,
        (SaveMode::ErrorIfExists, TableExistence::Exists) => ModeAction::Abort,
        (SaveMode::Ignore, TableExistence::Exists) => ModeAction::Skip,
        (SaveMode::Overwrite, TableExistence::Exists) => ModeAction::DeleteAndInitialize,
        (SaveMode::Append, TableExistence::Exists) => ModeAction::Proceed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_table() {
        use ModeAction::*;
        use TableExistence::*;
        let cases = [
            (SaveMode::ErrorIfExists, Exists, Abort),
            (SaveMode::ErrorIfExists, NotExists, Initialize),
            (SaveMode::Ignore, Exists, Skip),
            (SaveMode::Ignore, NotExists, Initialize),
            (SaveMode::Overwrite, Exists, DeleteAndInitialize),
            (SaveMode::Overwrite, NotExists, Initialize),
            (SaveMode::Append, Exists, Proceed),
            (SaveMode::Append, NotExists, Initialize),
        ];
        for (mode, existence, expected) in cases {
            assert_eq!(resolve_mode(mode, existence), expected, "{mode} / {existence:?}");
        }
    }

    #[test]
    fn parse_save_mode() {
        assert_eq!("append".parse::<SaveMode>().unwrap(), SaveMode::Append);
        assert_eq!("Overwrite".parse::<SaveMode>().unwrap(), SaveMode::Overwrite);
        assert_eq!("error".parse::<SaveMode>().unwrap(), SaveMode::ErrorIfExists);
        assert_eq!(
            "error_if_exists".parse::<SaveMode>().unwrap(),
            SaveMode::ErrorIfExists
        );
        assert!("replace".parse::<SaveMode>().is_err());
        assert_eq!(SaveMode::default(), SaveMode::Append);
    }
}
