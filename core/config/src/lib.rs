// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

pub mod configuration;
pub mod runtime;

pub use configuration::{Configuration, ConfigurationError, validate_token};
pub use runtime::RuntimeConfiguration;
