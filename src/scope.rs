use std::fmt;

use crate::error::{Error, Result};

/// Team slugs that collide with routing tokens and can never name a team.
pub const RESERVED_TEAM_SLUGS: &[&str] = &["compare", "all", "new"];

/// Whose metrics are being fetched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Organization { org: String },
    Team { org: String, team: String },
}

impl Scope {
    pub fn organization(org: &str) -> Result<Self> {
        let scope = Scope::Organization {
            org: org.trim().to_string(),
        };
        scope.validate()?;
        Ok(scope)
    }

    pub fn team(org: &str, team: &str) -> Result<Self> {
        let scope = Scope::Team {
            org: org.trim().to_string(),
            team: team.trim().to_string(),
        };
        scope.validate()?;
        Ok(scope)
    }

    pub fn org(&self) -> &str {
        match self {
            Scope::Organization { org } | Scope::Team { org, .. } => org,
        }
    }

    pub fn team_slug(&self) -> Option<&str> {
        match self {
            Scope::Organization { .. } => None,
            Scope::Team { team, .. } => Some(team),
        }
    }

    /// Reject malformed identifiers and reserved team slugs. Called before
    /// any fetch so these never reach the transport.
    pub fn validate(&self) -> Result<()> {
        if !is_slug(self.org()) {
            return Err(Error::InvalidScope(format!(
                "'{}' is not a valid organization name",
                self.org()
            )));
        }
        if let Some(team) = self.team_slug() {
            if RESERVED_TEAM_SLUGS.contains(&team.to_lowercase().as_str()) {
                return Err(Error::InvalidScope(format!(
                    "'{team}' is a reserved name and cannot be used as a team slug"
                )));
            }
            if !is_slug(team) {
                return Err(Error::InvalidScope(format!(
                    "'{team}' is not a valid team slug"
                )));
            }
        }
        Ok(())
    }

    /// Key used for cache lookups.
    pub fn to_key(&self) -> String {
        match self {
            Scope::Organization { org } => format!("org:{org}"),
            Scope::Team { org, team } => format!("team:{org}/{team}"),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Organization { org } => write!(f, "organization '{org}'"),
            Scope::Team { org, team } => write!(f, "team '{team}' in organization '{org}'"),
        }
    }
}

/// Check if a string is usable as an organization or team slug.
pub fn is_slug(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('.')
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

/// Parse a scope identifier.
///
/// Accepted forms:
/// - `acme`: organization
/// - `acme/web`: team `web` in organization `acme`
/// - `https://github.com/orgs/acme/teams/web`: team
/// - `https://github.com/orgs/acme` or `https://github.com/acme`: organization
pub fn parse_scope(input: &str) -> Result<Scope> {
    let input = input.trim();
    if input.starts_with("http://") || input.starts_with("https://") {
        return parse_scope_url(input);
    }
    match input.split_once('/') {
        Some((org, team)) => Scope::team(org, team),
        None => Scope::organization(input),
    }
}

/// Resolve a bare team slug (or full identifier) against a default org.
pub fn resolve_team(org: &str, identifier: &str) -> Result<Scope> {
    if identifier.contains('/') {
        let scope = parse_scope(identifier)?;
        if scope.team_slug().is_none() {
            return Err(Error::InvalidScope(format!(
                "'{identifier}' does not name a team"
            )));
        }
        return Ok(scope);
    }
    Scope::team(org, identifier)
}

fn parse_scope_url(input: &str) -> Result<Scope> {
    let url = url::Url::parse(input).map_err(|e| Error::InvalidScope(e.to_string()))?;
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    match segments.as_slice() {
        ["orgs", org, "teams", team, ..] => Scope::team(org, team),
        ["orgs", org, ..] => Scope::organization(org),
        [org] => Scope::organization(org),
        _ => Err(Error::InvalidScope(format!(
            "could not find an organization or team in URL: {input}"
        ))),
    }
}
