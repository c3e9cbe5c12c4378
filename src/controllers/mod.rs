/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/controllers/mod.rs
*
* SPDX-License-Identifier: Apache-2.0
*/

pub mod cluster_controller;
pub mod rbac_workload;
