// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Achievement and challenge catalog loading.

use crate::models::{Achievement, Challenge};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Definitions every user is seeded with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub achievements: Vec<Achievement>,
    #[serde(default)]
    pub challenges: Vec<Challenge>,
}

/// Service wrapping the loaded catalog.
#[derive(Debug, Default, Clone)]
pub struct CatalogService {
    catalog: Catalog,
}

impl CatalogService {
    pub fn new(catalog: Catalog) -> Result<Self, CatalogError> {
        validate(&catalog)?;
        Ok(Self { catalog })
    }

    /// Load the catalog from a JSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let json_data =
            fs::read_to_string(path.as_ref()).map_err(|e| CatalogError::IoError(e.to_string()))?;
        Self::load_from_json(&json_data)
    }

    /// Load the catalog from a JSON string.
    pub fn load_from_json(json_data: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog = serde_json::from_str(json_data)
            .map_err(|e| CatalogError::ParseError(e.to_string()))?;

        let service = Self::new(catalog)?;
        tracing::info!(
            achievements = service.catalog.achievements.len(),
            challenges = service.catalog.challenges.len(),
            "Loaded catalog"
        );
        Ok(service)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}

fn validate(catalog: &Catalog) -> Result<(), CatalogError> {
    let mut seen = HashSet::new();
    for achievement in &catalog.achievements {
        if !seen.insert(achievement.id.as_str()) {
            return Err(CatalogError::DuplicateId(achievement.id.clone()));
        }
        if achievement.requirement == 0 {
            return Err(CatalogError::Invalid(format!(
                "achievement {} has a zero requirement",
                achievement.id
            )));
        }
    }

    let mut seen = HashSet::new();
    for challenge in &catalog.challenges {
        if !seen.insert(challenge.id.as_str()) {
            return Err(CatalogError::DuplicateId(challenge.id.clone()));
        }
        if challenge.end_date <= challenge.start_date {
            return Err(CatalogError::Invalid(format!(
                "challenge {} has an empty time window",
                challenge.id
            )));
        }
        if challenge.requirements.is_empty() {
            return Err(CatalogError::Invalid(format!(
                "challenge {} has no requirements",
                challenge.id
            )));
        }
    }

    Ok(())
}

/// Errors from catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read file: {0}")]
    IoError(String),

    #[error("Failed to parse catalog: {0}")]
    ParseError(String),

    #[error("Duplicate catalog id: {0}")]
    DuplicateId(String),

    #[error("Invalid catalog entry: {0}")]
    Invalid(String),
}
