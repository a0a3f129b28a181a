use super::{block::BlockData, graph::BlockGraph};

fn scale_vec3(value: &mut [f32; 3], scale: f32) {
    for component in value {
        *component *= scale;
    }
}

impl BlockGraph {
    /// Multiply every length in the graph by `scale`: object translations,
    /// translation keys, morph vectors and geometry vertices. Each block is
    /// rewritten once, however many parents share it.
    pub fn scale_tree(&mut self, scale: f32) {
        for block in self.blocks_mut() {
            if let Some(av) = block.av_mut() {
                scale_vec3(&mut av.translation, scale);
            }
            match &mut block.data {
                BlockData::KeyframeData(data) => {
                    for key in &mut data.translation_keys {
                        scale_vec3(&mut key.value, scale);
                    }
                }
                BlockData::MorphData(data) => {
                    for morph in &mut data.morphs {
                        for vector in &mut morph.vectors {
                            scale_vec3(vector, scale);
                        }
                    }
                }
                BlockData::TriShapeData(data) => {
                    for vertex in &mut data.geometry.vertices {
                        scale_vec3(vertex, scale);
                    }
                }
                BlockData::TriStripsData(data) => {
                    for vertex in &mut data.geometry.vertices {
                        scale_vec3(vertex, scale);
                    }
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{
        format::block::BlockData,
        testing::GraphBuilder,
        EPSILON,
    };

    #[test]
    fn scale_round_trip() {
        let mut builder = GraphBuilder::default();
        let shape = builder.triangle_mesh(
            "Shape",
            &[[0.3, -1.7, 12.5], [100.0, 0.01, 0.0], [-3.25, 7.0, 0.5]],
            &[[0, 1, 2]],
        );
        let root = builder.node("Root", [10.0, -20.0, 0.125], &[shape]);
        let original = builder.finish(root);

        for scale in [0.1, 0.5, 3.0, 10.0, 1.0 / 3.0] {
            let mut graph = original.clone();
            graph.scale_tree(scale);
            graph.scale_tree(1.0 / scale);
            for (before, after) in original.blocks().iter().zip(graph.blocks()) {
                if let (Some(a), Some(b)) = (before.av(), after.av()) {
                    for axis in 0..3 {
                        assert!((a.translation[axis] - b.translation[axis]).abs() < EPSILON);
                    }
                }
                if let (BlockData::TriShapeData(a), BlockData::TriShapeData(b)) =
                    (&before.data, &after.data)
                {
                    for (u, v) in a.geometry.vertices.iter().zip(&b.geometry.vertices) {
                        for axis in 0..3 {
                            assert!((u[axis] - v[axis]).abs() < EPSILON);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn shared_data_is_scaled_once() {
        let mut builder = GraphBuilder::default();
        let data = builder.tri_shape_data(&[[1.0, 2.0, 3.0]], &[]);
        let a = builder.shape("A", data);
        let b = builder.shape("B", data);
        let root = builder.node("Root", [0.0, 0.0, 0.0], &[a, b]);
        let mut graph = builder.finish(root);
        graph.scale_tree(0.1);

        let BlockData::TriShapeData(scaled) = &graph.get(data).unwrap().data else {
            panic!("expected shape data");
        };
        assert!((scaled.geometry.vertices[0][2] - 0.3).abs() < 1e-6);
    }
}
