use color_eyre::{eyre::eyre, Result};
use std::fmt;

/// Lifecycle of a worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Loaded but not installed
  Parsed,
  Installing,
  Installed,
  Activating,
  /// Controls pages, fetches go through the strategies
  Activated,
  /// Activation failed; the worker never controls pages
  Redundant,
}

impl WorkerState {
  /// Check that `self -> next` is a legal transition.
  pub fn advance(self, next: WorkerState) -> Result<WorkerState> {
    use WorkerState::*;

    let legal = matches!(
      (self, next),
      (Parsed, Installing)
        | (Installing, Installed)
        | (Installed, Activating)
        | (Activating, Activated)
        | (Activating, Redundant)
        | (Parsed, Activated)
    );

    if legal {
      Ok(next)
    } else {
      Err(eyre!("Illegal worker transition: {} -> {}", self, next))
    }
  }

  pub fn controls_pages(self) -> bool {
    self == WorkerState::Activated
  }
}

impl fmt::Display for WorkerState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      WorkerState::Parsed => "parsed",
      WorkerState::Installing => "installing",
      WorkerState::Installed => "installed",
      WorkerState::Activating => "activating",
      WorkerState::Activated => "activated",
      WorkerState::Redundant => "redundant",
    };
    f.write_str(name)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_full_lifecycle() {
    let state = WorkerState::Parsed
      .advance(WorkerState::Installing)
      .and_then(|s| s.advance(WorkerState::Installed))
      .and_then(|s| s.advance(WorkerState::Activating))
      .and_then(|s| s.advance(WorkerState::Activated))
      .unwrap();
    assert!(state.controls_pages());
  }

  #[test]
  fn test_resume_skips_install() {
    assert_eq!(
      WorkerState::Parsed.advance(WorkerState::Activated).unwrap(),
      WorkerState::Activated
    );
  }

  #[test]
  fn test_activate_before_install_is_illegal() {
    assert!(WorkerState::Parsed.advance(WorkerState::Activating).is_err());
    assert!(WorkerState::Activated.advance(WorkerState::Installing).is_err());
  }
}
