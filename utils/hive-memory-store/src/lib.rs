/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/


//! In-memory collaborators for `hive-hub`: a message store and a static-file access control.
//!
//! Both are meant for tests, demos and the reference server; neither persists anything.

mod memory_store;
mod static_access;

pub use memory_store::InMemoryMessageStore;
pub use static_access::StaticAccessControl;
