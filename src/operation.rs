//! Declarative operation specs and the registry that holds them.
//!
//! An [`OperationSpec`] describes one callable REST endpoint: its URL template,
//! HTTP method, and the contract its arguments must satisfy. An
//! [`OperationRegistry`] maps operation names to specs and is immutable once built.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// The HTTP methods an operation can be declared with.
///
/// Deserializes from either upper- or lower-case names (`"GET"` or `"get"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "delete")]
    Delete,
    #[serde(alias = "patch")]
    Patch,
    #[serde(alias = "head")]
    Head,
    #[serde(alias = "options")]
    Options,
}

impl From<HttpMethod> for http::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => http::Method::GET,
            HttpMethod::Post => http::Method::POST,
            HttpMethod::Put => http::Method::PUT,
            HttpMethod::Delete => http::Method::DELETE,
            HttpMethod::Patch => http::Method::PATCH,
            HttpMethod::Head => http::Method::HEAD,
            HttpMethod::Options => http::Method::OPTIONS,
        }
    }
}

/// Declarative description of one REST operation.
///
/// Path variables are `{name}` placeholders in `url`. Every argument of a call
/// that is not a path variable becomes a query parameter and must be listed in
/// `allowed_params`. Header names are case-insensitive and stored in lower case.
///
/// # Examples
///
/// ```
/// use opcall::{HttpMethod, OperationSpec};
///
/// let spec = OperationSpec::new(HttpMethod::Get, "https://api.example.com/users/{id}")
///     .path_vars(["id"])
///     .allowed_params(["fields", "key"])
///     .required_params(["key"])
///     .allowed_headers(["Accept"]);
///
/// assert!(spec.validate("get_user").is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSpec {
    /// URL template with `{name}` placeholders.
    pub url: String,
    /// The HTTP method.
    pub method: HttpMethod,
    /// Placeholders that must be supplied and substituted into `url`.
    #[serde(default)]
    pub path_vars: BTreeSet<String>,
    /// Query parameters that must be supplied.
    #[serde(default)]
    pub required_params: BTreeSet<String>,
    /// Query parameters that may be supplied.
    #[serde(default)]
    pub allowed_params: BTreeSet<String>,
    /// Headers that must be supplied.
    #[serde(default)]
    pub required_headers: BTreeSet<String>,
    /// Headers that may be supplied.
    #[serde(default)]
    pub allowed_headers: BTreeSet<String>,
}

impl OperationSpec {
    /// Creates a spec with empty parameter and header contracts.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            path_vars: BTreeSet::new(),
            required_params: BTreeSet::new(),
            allowed_params: BTreeSet::new(),
            required_headers: BTreeSet::new(),
            allowed_headers: BTreeSet::new(),
        }
    }

    /// Declares the path variables of the URL template.
    pub fn path_vars<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path_vars.extend(names.into_iter().map(Into::into));
        self
    }

    /// Declares the query parameters that must be supplied.
    pub fn required_params<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_params.extend(names.into_iter().map(Into::into));
        self
    }

    /// Declares the query parameters that may be supplied.
    pub fn allowed_params<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_params.extend(names.into_iter().map(Into::into));
        self
    }

    /// Declares the headers that must be supplied.
    pub fn required_headers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.required_headers
            .extend(names.into_iter().map(|n| n.as_ref().to_ascii_lowercase()));
        self
    }

    /// Declares the headers that may be supplied.
    pub fn allowed_headers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_headers
            .extend(names.into_iter().map(|n| n.as_ref().to_ascii_lowercase()));
        self
    }

    /// Checks that the spec is internally consistent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if a required param or header is not
    /// allowed, a declared path variable is missing from the URL, the URL has a
    /// placeholder that is not declared, or a name is both a path variable and an
    /// allowed param.
    pub fn validate(&self, operation: &str) -> Result<()> {
        let invalid = |reason: String| Error::InvalidOperation {
            operation: operation.to_string(),
            reason,
        };

        let not_allowed: Vec<_> = self
            .required_params
            .difference(&self.allowed_params)
            .collect();
        if !not_allowed.is_empty() {
            return Err(invalid(format!(
                "required params {:?} are not allowed params",
                not_allowed
            )));
        }

        let not_allowed: Vec<_> = self
            .required_headers
            .iter()
            .filter(|h| !self.allowed_headers.contains(&h.to_ascii_lowercase()))
            .collect();
        if !not_allowed.is_empty() {
            return Err(invalid(format!(
                "required headers {:?} are not allowed headers",
                not_allowed
            )));
        }

        let placeholders = placeholders(&self.url);
        let absent: Vec<_> = self.path_vars.difference(&placeholders).collect();
        if !absent.is_empty() {
            return Err(invalid(format!(
                "path variables {:?} do not appear in {}",
                absent, self.url
            )));
        }
        let undeclared: Vec<_> = placeholders.difference(&self.path_vars).collect();
        if !undeclared.is_empty() {
            return Err(invalid(format!(
                "placeholders {:?} are not declared path variables",
                undeclared
            )));
        }

        let ambiguous: Vec<_> = self.path_vars.intersection(&self.allowed_params).collect();
        if !ambiguous.is_empty() {
            return Err(invalid(format!(
                "{:?} are both path variables and params",
                ambiguous
            )));
        }

        Ok(())
    }

    /// Substitutes path variables into the URL template.
    ///
    /// Substitution is textual: values are inserted as given, without escaping.
    /// Placeholders with no value are left untouched.
    ///
    /// # Examples
    ///
    /// ```
    /// use opcall::{HttpMethod, OperationSpec};
    /// use std::collections::BTreeMap;
    ///
    /// let spec = OperationSpec::new(HttpMethod::Get, "https://h/t/{location}/{start}")
    ///     .path_vars(["location", "start"]);
    ///
    /// let mut args = BTreeMap::new();
    /// args.insert("location".to_string(), "X".to_string());
    /// args.insert("start".to_string(), "5".to_string());
    ///
    /// assert_eq!(spec.resolve_url(&args), "https://h/t/X/5");
    /// ```
    pub fn resolve_url(&self, args: &BTreeMap<String, String>) -> String {
        let mut resolved = String::with_capacity(self.url.len());
        let mut rest = self.url.as_str();

        while let Some(open) = rest.find('{') {
            resolved.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                resolved.push_str(&rest[open..]);
                rest = "";
                break;
            };
            let name = &after[..close];
            match args.get(name).filter(|_| self.path_vars.contains(name)) {
                Some(value) => resolved.push_str(value),
                None => resolved.push_str(&rest[open..open + close + 2]),
            }
            rest = &after[close + 1..];
        }

        resolved.push_str(rest);
        resolved
    }

    fn normalized(mut self) -> Self {
        self.required_headers = lowercase(self.required_headers);
        self.allowed_headers = lowercase(self.allowed_headers);
        self
    }
}

fn lowercase(names: BTreeSet<String>) -> BTreeSet<String> {
    names.into_iter().map(|n| n.to_ascii_lowercase()).collect()
}

/// Collects the `{name}` placeholders of a URL template.
fn placeholders(template: &str) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else { break };
        found.insert(after[..close].to_string());
        rest = &after[close + 1..];
    }
    found
}

/// An immutable mapping from operation name to [`OperationSpec`].
///
/// Built once, validated at build time, and owned by each client.
///
/// # Examples
///
/// ```
/// use opcall::{HttpMethod, OperationRegistry, OperationSpec};
///
/// let registry = OperationRegistry::builder()
///     .operation(
///         "get_user",
///         OperationSpec::new(HttpMethod::Get, "https://api.example.com/users/{id}")
///             .path_vars(["id"]),
///     )
///     .build()
///     .unwrap();
///
/// assert!(registry.get("get_user").is_some());
/// assert_eq!(registry.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct OperationRegistry {
    operations: HashMap<String, OperationSpec>,
}

impl OperationRegistry {
    /// Creates a new `RegistryBuilder`.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Loads a registry from a JSON object mapping names to specs.
    ///
    /// # Examples
    ///
    /// ```
    /// use opcall::OperationRegistry;
    ///
    /// let registry = OperationRegistry::from_json(r#"{
    ///     "get_time": {
    ///         "url": "https://h/timeline/{location}/{start_date}",
    ///         "method": "get",
    ///         "path_vars": ["location", "start_date"],
    ///         "required_params": ["key"],
    ///         "allowed_params": ["key", "include"]
    ///     }
    /// }"#).unwrap();
    ///
    /// assert!(registry.get("get_time").is_some());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] for malformed documents and
    /// [`Error::InvalidOperation`] for specs that fail validation.
    pub fn from_json(json: &str) -> Result<Self> {
        let specs: BTreeMap<String, OperationSpec> = serde_json::from_str(json)?;
        specs
            .into_iter()
            .fold(Self::builder(), |builder, (name, spec)| {
                builder.operation(name, spec)
            })
            .build()
    }

    /// Returns the spec registered under `name`.
    pub fn get(&self, name: &str) -> Option<&OperationSpec> {
        self.operations.get(name)
    }

    /// Returns the spec registered under `name`, or [`Error::UnconfiguredOperation`].
    pub fn resolve(&self, name: &str) -> Result<&OperationSpec> {
        self.get(name).ok_or_else(|| Error::UnconfiguredOperation {
            operation: name.to_string(),
        })
    }

    /// Returns the number of registered operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns `true` if no operation is registered.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Returns the registered operation names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.operations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Builder for an [`OperationRegistry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    operations: Vec<(String, OperationSpec)>,
}

impl RegistryBuilder {
    /// Adds an operation under `name`.
    pub fn operation(mut self, name: impl Into<String>, spec: OperationSpec) -> Self {
        self.operations.push((name.into(), spec));
        self
    }

    /// Validates every spec and builds the registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if a name is registered twice or a
    /// spec fails [`OperationSpec::validate`].
    pub fn build(self) -> Result<OperationRegistry> {
        let mut operations = HashMap::with_capacity(self.operations.len());
        for (name, spec) in self.operations {
            let spec = spec.normalized();
            spec.validate(&name)?;
            if operations.contains_key(&name) {
                return Err(Error::InvalidOperation {
                    operation: name,
                    reason: "registered more than once".to_string(),
                });
            }
            operations.insert(name, spec);
        }
        Ok(OperationRegistry { operations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline() -> OperationSpec {
        OperationSpec::new(
            HttpMethod::Get,
            "https://weather.example.com/timeline/{location}/{start_date}/{end_date}",
        )
        .path_vars(["location", "start_date", "end_date"])
        .allowed_params(["key", "include"])
        .required_params(["key"])
    }

    fn args(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_resolve_url_is_textual() {
        let spec = timeline();
        let resolved = spec.resolve_url(&args(&[
            ("location", "38.9697,-77.385"),
            ("start_date", "1600000000"),
            ("end_date", "1600003600"),
            ("key", "secret"),
        ]));
        assert_eq!(
            resolved,
            "https://weather.example.com/timeline/38.9697,-77.385/1600000000/1600003600"
        );
    }

    #[test]
    fn test_resolve_url_leaves_unknown_placeholders() {
        let spec = OperationSpec::new(HttpMethod::Get, "https://h/{a}/{b}").path_vars(["a"]);
        assert_eq!(spec.resolve_url(&args(&[("a", "1"), ("b", "2")])), "https://h/1/{b}");
    }

    #[test]
    fn test_validate_accepts_consistent_spec() {
        assert!(timeline().validate("get_timeline").is_ok());
    }

    #[test]
    fn test_validate_rejects_required_not_allowed() {
        let spec = OperationSpec::new(HttpMethod::Get, "https://h/x").required_params(["key"]);
        match spec.validate("op") {
            Err(Error::InvalidOperation { operation, reason }) => {
                assert_eq!(operation, "op");
                assert!(reason.contains("key"));
            }
            other => panic!("Expected InvalidOperation, got {:?}", other),
        }

        let spec = OperationSpec::new(HttpMethod::Get, "https://h/x").required_headers(["X-Api"]);
        assert!(matches!(
            spec.validate("op"),
            Err(Error::InvalidOperation { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_path_var_mismatch() {
        let spec = OperationSpec::new(HttpMethod::Get, "https://h/{a}").path_vars(["a", "b"]);
        assert!(matches!(
            spec.validate("op"),
            Err(Error::InvalidOperation { .. })
        ));

        let spec = OperationSpec::new(HttpMethod::Get, "https://h/{a}/{c}").path_vars(["a"]);
        assert!(matches!(
            spec.validate("op"),
            Err(Error::InvalidOperation { .. })
        ));

        let spec = OperationSpec::new(HttpMethod::Get, "https://h/{a}")
            .path_vars(["a"])
            .allowed_params(["a"]);
        assert!(matches!(
            spec.validate("op"),
            Err(Error::InvalidOperation { .. })
        ));
    }

    #[test]
    fn test_header_names_are_lowercased() {
        let spec = OperationSpec::new(HttpMethod::Get, "https://h/x")
            .allowed_headers(["Accept", "X-Trace"])
            .required_headers(["X-TRACE"]);
        assert!(spec.allowed_headers.contains("accept"));
        assert!(spec.required_headers.contains("x-trace"));
        assert!(spec.validate("op").is_ok());
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let result = OperationRegistry::builder()
            .operation("a", timeline())
            .operation("a", timeline())
            .build();
        assert!(matches!(result, Err(Error::InvalidOperation { .. })));
    }

    #[test]
    fn test_registry_resolve_unknown() {
        let registry = OperationRegistry::default();
        assert!(registry.is_empty());
        match registry.resolve("missing") {
            Err(Error::UnconfiguredOperation { operation }) => assert_eq!(operation, "missing"),
            other => panic!("Expected UnconfiguredOperation, got {:?}", other),
        }
    }

    #[test]
    fn test_registry_from_json() {
        let registry = OperationRegistry::from_json(
            r#"{
                "delete_item": {
                    "url": "https://h/items/{id}",
                    "method": "DELETE",
                    "path_vars": ["id"],
                    "allowed_headers": ["Authorization"],
                    "required_headers": ["authorization"]
                },
                "list_items": { "url": "https://h/items", "method": "get" }
            }"#,
        )
        .unwrap();

        assert_eq!(registry.names(), vec!["delete_item", "list_items"]);
        let spec = registry.get("delete_item").unwrap();
        assert_eq!(spec.method, HttpMethod::Delete);
        assert!(spec.allowed_headers.contains("authorization"));
        assert!(registry.get("list_items").unwrap().path_vars.is_empty());
    }

    #[test]
    fn test_registry_from_json_errors() {
        assert!(matches!(
            OperationRegistry::from_json("[1, 2]"),
            Err(Error::Json(_))
        ));
        assert!(matches!(
            OperationRegistry::from_json(r#"{"x": {"url": "https://h/{id}", "method": "GET"}}"#),
            Err(Error::InvalidOperation { .. })
        ));
    }

    #[test]
    fn test_method_conversion() {
        assert_eq!(http::Method::from(HttpMethod::Patch), http::Method::PATCH);
        let method: HttpMethod = serde_json::from_str("\"put\"").unwrap();
        assert_eq!(method, HttpMethod::Put);
    }
}
