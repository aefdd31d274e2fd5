use std::fmt;
use std::str::FromStr;

use chrono::{Duration, Local, NaiveDateTime, SubsecRound};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::ids::IdGenerator;

/// Visibility of a paste.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Listed in recent pastes and searchable.
    Public,
    /// Reachable only by its exact id.
    Unlisted,
}

impl Access {
    pub fn as_str(&self) -> &'static str {
        match self {
            Access::Public => "PUBLIC",
            Access::Unlisted => "UNLISTED",
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Access {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("public") {
            Ok(Access::Public)
        } else if s.eq_ignore_ascii_case("unlisted") {
            Ok(Access::Unlisted)
        } else {
            Err(AppError::InvalidAccessLevel(s.to_owned()))
        }
    }
}

/// A request to create a paste, as submitted by a client.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasteRequest {
    pub text: String,
    pub access: String,
    pub validity_in_seconds: u64,
}

/// A stored paste.
///
/// Timestamps are naive local times truncated to whole seconds. The only way to build
/// one outside of decoding is [`Paste::from_request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paste {
    id: i64,
    text: String,
    access: Access,
    created_at: NaiveDateTime,
    expire_at: NaiveDateTime,
}

impl Paste {
    /// Build a paste from a request, stamped with the current local time.
    pub fn from_request(request: PasteRequest, ids: &impl IdGenerator) -> AppResult<Self> {
        Self::from_request_at(request, Local::now().naive_local(), ids)
    }

    pub(crate) fn from_request_at(
        request: PasteRequest,
        now: NaiveDateTime,
        ids: &impl IdGenerator,
    ) -> AppResult<Self> {
        let access: Access = request.access.parse()?;

        let created_at = now.trunc_subsecs(0);
        let validity = i64::try_from(request.validity_in_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or(AppError::ValidityOutOfRange(request.validity_in_seconds))?;
        let expire_at = created_at
            .checked_add_signed(validity)
            .ok_or(AppError::ValidityOutOfRange(request.validity_in_seconds))?;

        let id = ids.generate(&request.text, created_at);

        Ok(Paste {
            id,
            text: request.text,
            access,
            created_at,
            expire_at,
        })
    }

    /// Reassemble a paste from stored fields.
    pub(crate) fn from_parts(
        id: i64,
        text: String,
        access: Access,
        created_at: NaiveDateTime,
        expire_at: NaiveDateTime,
    ) -> Self {
        Paste {
            id,
            text,
            access,
            created_at,
            expire_at,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn created_at(&self) -> NaiveDateTime {
        self.created_at
    }

    pub fn expire_at(&self) -> NaiveDateTime {
        self.expire_at
    }
}
