//! User model and related types
//!
//! Accounts are managed elsewhere; this service only reads the fields
//! needed for scheduling and geofenced marking.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::enums::Role;
use crate::error::AppError;

/// Read-only view of a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct UserProfile {
    pub id: Uuid,
    pub agency_id: Uuid,
    pub role: Role,
    pub home_latitude: Option<f64>,
    pub home_longitude: Option<f64>,
    pub home_radius_meters: Option<i32>,
}

/// Configured home geofence of a user
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HomeLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: i32,
}

impl UserProfile {
    /// Home geofence, only when all three fields are configured
    pub fn home_location(&self) -> Option<HomeLocation> {
        match (self.home_latitude, self.home_longitude, self.home_radius_meters) {
            (Some(latitude), Some(longitude), Some(radius_meters)) => Some(HomeLocation {
                latitude,
                longitude,
                radius_meters,
            }),
            _ => None,
        }
    }
}

/// JWT Claims for authenticated users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    /// User ID
    pub sub: Uuid,
    pub agency_id: Uuid,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl UserClaims {
    /// Create a new JWT token from claims
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Decode and validate JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Authorization("Administrator role required".to_string()))
        }
    }
}
