// Copyright (C) 2025 PSO Unit, Fondazione Bruno Kessler
// This file is part of H2Lite.
//
// H2Lite is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// H2Lite is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.
//

pub mod heuristics;
pub mod pairs;
pub mod pi_two;
pub mod task;

use pyo3::prelude::*;
use pyo3::types::PyModule;

use heuristics::Heuristic;
use pi_two::PiTwoTask;
use task::{Operator, Task};

/// A Python module implemented in Rust.
#[pymodule]
fn rusth2(_py: Python, m: Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<Task>()?;
    m.add_class::<Operator>()?;
    m.add_class::<Heuristic>()?;
    m.add_class::<PiTwoTask>()?;
    m.add("DEAD_END", heuristics::DEAD_END)?;

    Ok(())
}
