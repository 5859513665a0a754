//! Runner configuration

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Main window parameters
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: format!("App Loop - {}", env!("CARGO_PKG_VERSION")),
            width: 800,
            height: 600,
            resizable: true,
        }
    }
}

/// Presentation synchronization
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum VSync {
    Disabled,
    #[default]
    Enabled,
    /// Late swap tearing, where the platform supports it
    Adaptive,
}

impl VSync {
    /// Interval value in the SDL convention (1 = on, 0 = off, -1 = adaptive)
    pub fn interval(self) -> i32 {
        match self {
            VSync::Disabled => 0,
            VSync::Enabled => 1,
            VSync::Adaptive => -1,
        }
    }
}

/// Basic runner configuration
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RunnerConfig {
    pub window: WindowConfig,
    pub vsync: VSync,
    /// Request `exit(0)` when the platform reports an application quit event
    pub exit_on_quit_event: bool,
    /// Request `exit(0)` when Escape is pressed
    pub exit_on_escape: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            vsync: VSync::default(),
            exit_on_quit_event: true,
            exit_on_escape: true,
        }
    }
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;
    use serde::de::value::{Error, MapDeserializer};

    #[test]
    fn missing_fields_take_defaults() {
        let empty = MapDeserializer::<_, Error>::new(std::iter::empty::<(&str, bool)>());
        assert_eq!(RunnerConfig::deserialize(empty).unwrap(), RunnerConfig::default());

        let partial = MapDeserializer::<_, Error>::new([("exit_on_escape", false)].into_iter());
        let config = RunnerConfig::deserialize(partial).unwrap();
        assert!(!config.exit_on_escape);
        assert!(config.exit_on_quit_event);
        assert_eq!(config.window, WindowConfig::default());
    }

    #[test]
    fn window_size_can_be_overridden() {
        let fields =
            MapDeserializer::<_, Error>::new([("width", 1280u32), ("height", 720)].into_iter());
        let window = WindowConfig::deserialize(fields).unwrap();
        assert_eq!((window.width, window.height), (1280, 720));
        assert!(window.resizable);
    }

    #[test]
    fn config_types_serialize() {
        fn assert_serialize<T: Serialize>() {}
        assert_serialize::<RunnerConfig>();
        assert_serialize::<WindowConfig>();
        assert_serialize::<VSync>();
    }
}
