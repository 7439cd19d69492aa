//! Resource links: `{protocol}://{host}:{port}{prefix}/{plural}[/{suffix}]`.

use crate::config::LinkConfig;

#[derive(Clone, Debug)]
pub struct LinkGenerator {
    base: String,
}

impl LinkGenerator {
    pub fn new(config: &LinkConfig) -> Self {
        LinkGenerator {
            base: format!(
                "{}://{}:{}{}",
                config.protocol(),
                config.host(),
                config.port(),
                config.prefix.trim_end_matches('/')
            ),
        }
    }

    pub fn collection(&self, plural: &str) -> String {
        format!("{}/{}", self.base, plural)
    }

    pub fn resource(&self, plural: &str, id: &str) -> String {
        format!("{}/{}/{}", self.base, plural, id)
    }

    pub fn related(&self, plural: &str, id: &str, relation: &str) -> String {
        format!("{}/{}/{}/{}", self.base, plural, id, relation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_links() {
        let links = LinkGenerator::new(&LinkConfig {
            ssl: false,
            host: Some("api.test".into()),
            port: Some(1337),
            prefix: "/v1/".into(),
        });
        assert_eq!(links.collection("foos"), "http://api.test:1337/v1/foos");
        assert_eq!(links.resource("foos", "2"), "http://api.test:1337/v1/foos/2");
        assert_eq!(links.related("foos", "2", "my-bar"), "http://api.test:1337/v1/foos/2/my-bar");
    }

    #[test]
    fn test_default_port_follows_protocol() {
        let links = LinkGenerator::new(&LinkConfig {
            ssl: true,
            ..LinkConfig::default()
        });
        assert_eq!(links.collection("articles"), "https://localhost:443/articles");
    }
}
