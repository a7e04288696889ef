//! Template resolution for requested labels.

use crate::config::ContainerTemplate;

/// The set of container templates owned by one cloud profile.
///
/// Resolution is deterministic and side-effect free: templates are consulted
/// in declared order and the first match wins.
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    templates: Vec<ContainerTemplate>,
}

impl TemplateCatalog {
    /// Create a catalog over the profile's templates, preserving order.
    #[must_use]
    pub fn new(templates: Vec<ContainerTemplate>) -> Self {
        Self { templates }
    }

    /// Resolve the template serving the requested label.
    ///
    /// A `None` label is a wildcard satisfied by the first declared template.
    #[must_use]
    pub fn resolve(&self, label: Option<&str>) -> Option<&ContainerTemplate> {
        self.templates.iter().find(|t| t.matches(label))
    }

    /// All templates, in declared order.
    #[must_use]
    pub fn templates(&self) -> &[ContainerTemplate] {
        &self.templates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CloudProfile;

    fn catalog() -> TemplateCatalog {
        let profile = CloudProfile::from_toml(
            r#"
            name = "profile"
            credentials_id = "sp"
            resource_group = "rg"

            [controller]
            url = "https://ci.example.com/"
            instance_id = "controller-1"

            [[templates]]
            name = "linux"
            label = "linux docker"
            image = "example.azurecr.io/linux:latest"

            [[templates]]
            name = "windows"
            label = "windows"
            image = "example.azurecr.io/windows:latest"
            os_type = "windows"
            "#,
        )
        .unwrap();
        TemplateCatalog::new(profile.templates)
    }

    #[test]
    fn first_match_wins() {
        let catalog = catalog();
        assert_eq!(catalog.resolve(Some("linux")).unwrap().name, "linux");
        assert_eq!(catalog.resolve(Some("windows")).unwrap().name, "windows");
    }

    #[test]
    fn wildcard_returns_first_template() {
        let catalog = catalog();
        assert_eq!(catalog.resolve(None).unwrap().name, "linux");
    }

    #[test]
    fn no_match_returns_none() {
        let catalog = catalog();
        assert!(catalog.resolve(Some("macos")).is_none());
    }
}
