// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Tenants and landlords.

use crate::base::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Tenant,
    Landlord,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Tenant => "tenant",
            Role::Landlord => "landlord",
        })
    }
}

/// A registered party.
///
/// A tenant's `landlord_id` is written at most once, by whichever of plan
/// acceptance or deposit confirmation happens first. The points balance lives
/// in the tenant's points account, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub role: Role,
    pub name: String,
    pub email: String,
    pub landlord_id: Option<UserId>,
}

impl User {
    pub fn new(id: UserId, role: Role, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            role,
            name: name.into(),
            email: email.into(),
            landlord_id: None,
        }
    }

    /// Records the landlord relationship if none exists yet.
    ///
    /// Returns `true` when this call established the link.
    pub(crate) fn link_landlord(&mut self, landlord_id: UserId) -> bool {
        if self.landlord_id.is_some() {
            return false;
        }
        self.landlord_id = Some(landlord_id);
        true
    }
}
