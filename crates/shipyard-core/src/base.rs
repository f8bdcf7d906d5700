use crate::container::Container;

pub const DEFAULT_IMAGE: &str = "node:22-slim";
pub const DEFAULT_GLOBAL_TOOLS: &[&str] = &["firebase-tools"];

/// Node.js image with the deploy CLI installed globally.
///
/// Every pipeline stage starts from a fresh [`BaseEnvironment::container`].
/// The engine executor runs each stage in a new container and does no layer
/// caching of its own; pulled images are cached by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseEnvironment {
    pub image: String,
    pub global_tools: Vec<String>,
}

impl Default for BaseEnvironment {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            global_tools: DEFAULT_GLOBAL_TOOLS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl BaseEnvironment {
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn container(&self) -> Container {
        let container = Container::from_image(&self.image);
        if self.global_tools.is_empty() {
            return container;
        }
        let mut args = vec!["npm".to_string(), "install".into(), "-g".into()];
        args.extend(self.global_tools.iter().cloned());
        container.with_exec(args)
    }
}

/// The default base environment's container.
pub fn base_environment() -> Container {
    BaseEnvironment::default().container()
}
