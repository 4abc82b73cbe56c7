//! Typed view switching between the shell and its panels.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

/// Top-level view of the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum View {
    /// Overview cards.
    #[default]
    Dashboard,
    Tasks,
    Projects,
    Calendar,
    /// Time tracking.
    Time,
    Goals,
    Team,
    Settings,
    Notes,
    /// Assistant chat.
    Ai,
    /// Focus timer.
    Focus,
}

impl View {
    /// Every view in sidebar order.
    pub const ALL: [Self; 11] = [
        Self::Dashboard,
        Self::Tasks,
        Self::Projects,
        Self::Calendar,
        Self::Time,
        Self::Goals,
        Self::Team,
        Self::Settings,
        Self::Notes,
        Self::Ai,
        Self::Focus,
    ];

    /// Identifier used in links and configuration.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::Dashboard => "dashboard",
            Self::Tasks => "tasks",
            Self::Projects => "projects",
            Self::Calendar => "calendar",
            Self::Time => "time",
            Self::Goals => "goals",
            Self::Team => "team",
            Self::Settings => "settings",
            Self::Notes => "notes",
            Self::Ai => "ai",
            Self::Focus => "focus",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// A view id that names no view.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown view '{0}'")]
pub struct UnknownView(pub String);

impl FromStr for View {
    type Err = UnknownView;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|view| view.id().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownView(s.to_owned()))
    }
}

/// Owner of the current view.
#[derive(Debug)]
pub struct Navigator {
    current: Arc<watch::Sender<View>>,
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new(View::default())
    }
}

impl Navigator {
    /// Navigator starting at `initial`.
    #[must_use]
    pub fn new(initial: View) -> Self {
        let (tx, _) = watch::channel(initial);
        Self {
            current: Arc::new(tx),
        }
    }

    /// The view on screen.
    #[must_use]
    pub fn current(&self) -> View {
        *self.current.borrow()
    }

    /// Sender for a child panel.
    #[must_use]
    pub fn handle(&self) -> NavigationHandle {
        NavigationHandle {
            tx: Arc::clone(&self.current),
        }
    }

    /// Receiver following view changes.
    #[must_use]
    pub fn watch(&self) -> NavigationWatch {
        NavigationWatch {
            rx: self.current.subscribe(),
        }
    }
}

/// Lets a panel request another view.
#[derive(Debug, Clone)]
pub struct NavigationHandle {
    tx: Arc<watch::Sender<View>>,
}

impl NavigationHandle {
    /// Switch to `view`; re-selecting the current view notifies nobody.
    pub fn navigate(&self, view: View) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == view {
                return false;
            }
            *current = view;
            true
        });
        if changed {
            debug!(%view, "Navigated");
        }
    }
}

/// Follows the current view.
#[derive(Debug, Clone)]
pub struct NavigationWatch {
    rx: watch::Receiver<View>,
}

impl NavigationWatch {
    /// Latest view.
    #[must_use]
    pub fn current(&self) -> View {
        *self.rx.borrow()
    }

    /// Wait for the next switch and return the new view.
    ///
    /// # Errors
    /// Fails once the [`Navigator`] and every handle are gone.
    pub async fn changed(&mut self) -> Result<View, watch::error::RecvError> {
        self.rx.changed().await?;
        Ok(*self.rx.borrow_and_update())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;

    #[test]
    fn ids_round_trip_through_from_str() {
        for view in View::ALL {
            assert_eq!(view.id().parse::<View>().unwrap(), view);
        }
        assert_eq!(" Projects ".parse::<View>().unwrap(), View::Projects);
        assert_eq!(
            "inbox".parse::<View>().unwrap_err(),
            UnknownView("inbox".to_owned())
        );
    }

    #[tokio::test]
    async fn handles_drive_watchers() {
        let navigator = Navigator::default();
        let mut watch = navigator.watch();
        let handle = navigator.handle();

        handle.navigate(View::Focus);
        assert_eq!(watch.changed().await.unwrap(), View::Focus);
        assert_eq!(navigator.current(), View::Focus);
    }

    #[test]
    fn reselecting_the_current_view_is_silent() {
        let navigator = Navigator::new(View::Tasks);
        let watch = navigator.watch();
        navigator.handle().navigate(View::Tasks);
        assert!(!watch.rx.has_changed().unwrap());
    }
}
