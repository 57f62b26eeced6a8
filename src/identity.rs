use crate::error::{Error, Result};

/// The identity triple of a logger: instance name, logical service name and
/// API version tag.
///
/// Set once at construction or later through the setters; read by the
/// attachment protocol when computing per-kind defaults. Fields are
/// replaceable but never unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    name: Option<String>,
    service_type: Option<String>,
    api_version: Option<String>,
}

impl Identity {
    pub fn new(
        name: Option<String>,
        service_type: Option<String>,
        api_version: Option<String>,
    ) -> Self {
        Self {
            name,
            service_type,
            api_version,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn service_type(&self) -> Option<&str> {
        self.service_type.as_deref()
    }

    pub fn api_version(&self) -> Option<&str> {
        self.api_version.as_deref()
    }

    pub fn set_name(&mut self, value: impl Into<String>) {
        self.name = Some(value.into());
    }

    pub fn set_service_type(&mut self, value: impl Into<String>) {
        self.service_type = Some(value.into());
    }

    pub fn set_api_version(&mut self, value: impl Into<String>) {
        self.api_version = Some(value.into());
    }

    /// Returns `name` or fails the attach with the field's external name.
    pub(crate) fn require_name(&self) -> Result<&str> {
        self.name().ok_or(Error::MissingIdentity("name"))
    }

    /// Returns all three fields, checked in the order name, serviceType,
    /// apiVersion; the first missing one names the error.
    pub(crate) fn require_all(&self) -> Result<(&str, &str, &str)> {
        let name = self.require_name()?;
        let service_type = self
            .service_type()
            .ok_or(Error::MissingIdentity("serviceType"))?;
        let api_version = self
            .api_version()
            .ok_or(Error::MissingIdentity("apiVersion"))?;
        Ok((name, service_type, api_version))
    }
}
