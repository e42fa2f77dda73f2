// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

#![allow(dead_code)]

use datacontainer::{Array, DType, DcResult, Detector, SlitTraceSet, Spec2DObj};

pub type TestResult = anyhow::Result<()>;

pub const NSPEC: usize = 4;
pub const NSPAT: usize = 3;

pub fn detector(det: u32) -> DcResult<Detector> {
    Detector::builder()
        .dataext(det as i64)
        .specaxis(0)
        .specflip(false)
        .spatflip(true)
        .platescale(0.1185)
        .saturation(65535.0)
        .mincounts(-1e10)
        .nonlinear(0.76)
        .numamplifiers(2)
        .gain(vec![1.2, 1.3])
        .ronoise(vec![3.7, 3.9])
        .det(det)
        .xgap(0.0)
        .datasec(vec!["[:,1:1024]".to_string(), "[:,1025:2048]".to_string()])
        .build()
}

pub fn slits(mask: &[i16]) -> DcResult<SlitTraceSet> {
    let n = mask.len();
    let ids: Vec<i32> = (0..n as i32).map(|i| 50 + 100 * i).collect();
    SlitTraceSet::builder()
        .nspec(NSPEC as i64)
        .nspat(NSPAT as i64)
        .pypeline("MultiSlit")
        .spat_id(Array::from_i32(vec![n], &ids)?)
        .left_init(Array::zeros(DType::F64, vec![NSPEC, n])?)
        .right_init(Array::zeros(DType::F64, vec![NSPEC, n])?)
        .mask(Array::from_i16(vec![n], mask)?)
        .build()
}

/// A fully populated science frame whose pixels all hold `level`.
pub fn spec2d(det: u32, level: f32) -> DcResult<Spec2DObj> {
    let shape = vec![NSPEC, NSPAT];
    let pixels = vec![level; NSPEC * NSPAT];
    Spec2DObj::builder()
        .det(det)
        .sciimg(Array::from_f32(shape.clone(), &pixels)?)
        .ivarraw(Array::from_f32(shape.clone(), &vec![0.5; NSPEC * NSPAT])?)
        .skymodel(Array::from_f32(shape.clone(), &vec![level / 10.0; NSPEC * NSPAT])?)
        .bpmmask(Array::from_i16(shape, &vec![0; NSPEC * NSPAT])?)
        .slits(slits(&[0, 8])?)
        .sci_spat_flexure(0.25)
        .detector(detector(det)?)
        .build()
}
