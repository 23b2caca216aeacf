use crate::config::Environment;

/// Resolved endpoint roots for one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub auth: String,
    pub rest_root: String,
    pub soap: String,
}

fn trimmed(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

impl Endpoints {
    pub fn for_environment(env: &Environment) -> Self {
        let sub = &env.subdomain;
        Self {
            auth: env
                .auth_url
                .as_deref()
                .map(trimmed)
                .unwrap_or_else(|| format!("https://{sub}.auth.marketingcloudapis.com/v2/token")),
            rest_root: env
                .rest_url
                .as_deref()
                .map(trimmed)
                .unwrap_or_else(|| format!("https://{sub}.rest.marketingcloudapis.com")),
            soap: env
                .soap_url
                .as_deref()
                .map(trimmed)
                .unwrap_or_else(|| format!("https://{sub}.soap.marketingcloudapis.com/Service.asmx")),
        }
    }

    fn rowset_base(&self, external_key: &str) -> String {
        format!(
            "{}/data/v1/customobjectdata/key/{}/rowset",
            self.rest_root,
            urlencoding::encode(external_key)
        )
    }

    /// One-row probe used to learn the row count and sample a row.
    pub fn probe_url(&self, external_key: &str) -> String {
        format!("{}?$pageSize=1", self.rowset_base(external_key))
    }

    /// Canonical fetch URL of a page. Doubles as the page's identity in the
    /// state database, so the format must stay stable across releases.
    pub fn page_url(&self, external_key: &str, page_size: u64, page: u64) -> String {
        format!(
            "{}?$pageSize={page_size}&$page={page}",
            self.rowset_base(external_key)
        )
    }

    pub fn rows_url(&self, target_key: &str) -> String {
        format!(
            "{}/data/v1/async/dataextensions/key:{}/rows",
            self.rest_root,
            urlencoding::encode(target_key)
        )
    }

    pub fn results_url(&self, request_id: &str) -> String {
        format!(
            "{}/data/v1/async/{}/results",
            self.rest_root,
            urlencoding::encode(request_id)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(rest_url: Option<&str>) -> Environment {
        Environment {
            name: "qa".into(),
            subdomain: "mc-qa".into(),
            client_id: "id".into(),
            client_secret: "secret".into(),
            account_id: "1".into(),
            catalog_url: "https://cloud.example.com/catalog".into(),
            auth_url: None,
            rest_url: rest_url.map(String::from),
            soap_url: None,
        }
    }

    #[test]
    fn test_default_roots_from_subdomain() {
        let ep = Endpoints::for_environment(&env(None));
        assert_eq!(ep.auth, "https://mc-qa.auth.marketingcloudapis.com/v2/token");
        assert_eq!(ep.rest_root, "https://mc-qa.rest.marketingcloudapis.com");
        assert_eq!(
            ep.soap,
            "https://mc-qa.soap.marketingcloudapis.com/Service.asmx"
        );
    }

    #[test]
    fn test_override_wins_and_is_trimmed() {
        let ep = Endpoints::for_environment(&env(Some("http://127.0.0.1:8080/")));
        assert_eq!(ep.rest_root, "http://127.0.0.1:8080");
        assert_eq!(
            ep.rows_url("DE_TARGET"),
            "http://127.0.0.1:8080/data/v1/async/dataextensions/key:DE_TARGET/rows"
        );
    }

    #[test]
    fn test_page_url_embeds_size_and_index() {
        let ep = Endpoints::for_environment(&env(None));
        assert_eq!(
            ep.page_url("Customers", 500, 3),
            "https://mc-qa.rest.marketingcloudapis.com/data/v1/customobjectdata/key/Customers/rowset?$pageSize=500&$page=3"
        );
        assert!(ep.probe_url("Customers").ends_with("/rowset?$pageSize=1"));
    }

    #[test]
    fn test_keys_are_percent_encoded() {
        let ep = Endpoints::for_environment(&env(None));
        assert!(ep.probe_url("A B/C").contains("/key/A%20B%2FC/rowset"));
        assert!(ep.results_url("r-1").ends_with("/data/v1/async/r-1/results"));
    }
}
