use crate::clusters::{ClusterData, ClusterId, ClusterRun};

/// Id of the cluster with the most members; among equally big clusters the lowest id wins.
pub fn biggest_cluster_id(clusters: &ClusterData) -> Option<ClusterId> {
    clusters
        .iter()
        .max_by(|(id_a, a), (id_b, b)| a.len().cmp(&b.len()).then(id_b.cmp(id_a)))
        .map(|(cluster_id, _)| cluster_id)
}

/// Particle ids of the rods in the biggest cluster, in member order.
///
/// The biggest cluster is taken to be the membrane with everything stuck to it,
/// so lipids and other members without a rod id are left out.
pub fn adsorbed_rods(clusters: &ClusterData) -> Vec<u64> {
    biggest_cluster_id(clusters)
        .and_then(|cluster_id| clusters.get(cluster_id))
        .map(|members| {
            members
                .iter()
                .filter(|member| member.rod_id.is_some())
                .map(|member| member.particle_id)
                .collect()
        })
        .unwrap_or_default()
}

pub fn get_adsorbed(run: &ClusterRun) -> Vec<Vec<u64>> {
    run.frames
        .iter()
        .map(|frame| adsorbed_rods(&frame.clusters))
        .collect()
}
