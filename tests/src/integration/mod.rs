pub mod fixtures;

#[cfg(test)]
mod mesh_flows;
#[cfg(test)]
mod registry_flows;
