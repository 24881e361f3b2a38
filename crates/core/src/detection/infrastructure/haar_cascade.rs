use std::path::{Path, PathBuf};
use std::str::FromStr;

use roxmltree::{Document, Node as XmlNode};
use thiserror::Error;

use super::integral_image::IntegralImage;

#[derive(Error, Debug)]
pub enum ClassifierLoadError {
    #[error("failed to read classifier {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid classifier XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("unsupported classifier: {0}")]
    Unsupported(String),
    #[error("malformed classifier: {0}")]
    Malformed(String),
}

fn malformed(msg: impl Into<String>) -> ClassifierLoadError {
    ClassifierLoadError::Malformed(msg.into())
}

/// One weighted rectangle of a Haar feature, in window coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightedRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub weight: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HaarFeature {
    pub rects: Vec<WeightedRect>,
    pub tilted: bool,
}

/// Where a tree node sends the scan next.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Branch {
    Node(usize),
    Leaf(f64),
}

#[derive(Clone, Debug, PartialEq)]
pub struct TreeNode {
    pub feature: usize,
    pub threshold: f64,
    pub left: Branch,
    pub right: Branch,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stage {
    pub threshold: f64,
    pub trees: Vec<Vec<TreeNode>>,
}

/// A boosted cascade of Haar-feature decision trees trained on a fixed
/// detection window.
#[derive(Clone, Debug)]
pub struct HaarCascade {
    window: (u32, u32),
    stages: Vec<Stage>,
    features: Vec<HaarFeature>,
}

impl HaarCascade {
    /// Parse an OpenCV cascade file in either the `opencv-cascade-classifier`
    /// or the legacy `opencv-haar-classifier` layout.
    pub fn load(path: &Path) -> Result<Self, ClassifierLoadError> {
        let xml = std::fs::read_to_string(path).map_err(|source| ClassifierLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_xml_str(&xml)
    }

    pub fn from_xml_str(xml: &str) -> Result<Self, ClassifierLoadError> {
        let doc = Document::parse(xml)?;
        let (cascade_node, type_id) = doc
            .root_element()
            .children()
            .filter(|n| n.is_element())
            .find_map(|n| n.attribute("type_id").map(|t| (n, t)))
            .ok_or_else(|| malformed("no element with a type_id under the document root"))?;

        let cascade = match type_id {
            "opencv-cascade-classifier" => parse_current(cascade_node)?,
            "opencv-haar-classifier" => parse_legacy(cascade_node)?,
            other => {
                return Err(ClassifierLoadError::Unsupported(format!(
                    "type_id {other}"
                )))
            }
        };
        cascade.validate()?;
        Ok(cascade)
    }

    pub fn window(&self) -> (u32, u32) {
        self.window
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn has_tilted_features(&self) -> bool {
        self.features.iter().any(|f| f.tilted)
    }

    /// Run every stage on the window whose top-left corner is `(x, y)`.
    /// `inv_norm` is the reciprocal of the window's variance normaliser.
    pub(crate) fn evaluate(&self, ii: &IntegralImage, x: usize, y: usize, inv_norm: f64) -> bool {
        self.stages.iter().all(|stage| {
            let sum: f64 = stage
                .trees
                .iter()
                .map(|tree| self.walk_tree(tree, ii, x, y, inv_norm))
                .sum();
            sum >= stage.threshold
        })
    }

    fn walk_tree(&self, tree: &[TreeNode], ii: &IntegralImage, x: usize, y: usize, inv_norm: f64) -> f64 {
        let mut idx = 0;
        loop {
            let node = &tree[idx];
            let value = self.feature_value(&self.features[node.feature], ii, x, y) * inv_norm;
            let next = if value < node.threshold {
                node.left
            } else {
                node.right
            };
            match next {
                Branch::Leaf(v) => return v,
                Branch::Node(n) => idx = n,
            }
        }
    }

    fn feature_value(&self, feature: &HaarFeature, ii: &IntegralImage, x: usize, y: usize) -> f64 {
        feature
            .rects
            .iter()
            .map(|r| {
                let sum = if feature.tilted {
                    ii.tilted_sum(
                        x as i64 + r.x as i64,
                        y as i64 + r.y as i64,
                        r.width as i64,
                        r.height as i64,
                    )
                } else {
                    ii.rect_sum(
                        x + r.x as usize,
                        y + r.y as usize,
                        r.width as usize,
                        r.height as usize,
                    )
                };
                r.weight * sum
            })
            .sum()
    }

    /// Structural checks that make `evaluate` panic-free: rectangles fit the
    /// window, indices resolve, and child links only point forward.
    fn validate(&self) -> Result<(), ClassifierLoadError> {
        let (ww, wh) = (self.window.0 as i32, self.window.1 as i32);
        if ww < 3 || wh < 3 {
            return Err(malformed(format!("window {ww}x{wh} too small")));
        }
        if self.stages.is_empty() {
            return Err(malformed("cascade has no stages"));
        }
        for (i, feature) in self.features.iter().enumerate() {
            if feature.rects.is_empty() {
                return Err(malformed(format!("feature {i} has no rectangles")));
            }
            for r in &feature.rects {
                let fits = if feature.tilted {
                    r.x - r.height >= 0 && r.x + r.width <= ww && r.y >= 0 && r.y + r.width + r.height <= wh
                } else {
                    r.x >= 0 && r.y >= 0 && r.x + r.width <= ww && r.y + r.height <= wh
                };
                if r.width < 0 || r.height < 0 || !fits {
                    return Err(malformed(format!("feature {i} rectangle outside the window")));
                }
            }
        }
        for (s, stage) in self.stages.iter().enumerate() {
            if stage.trees.is_empty() {
                return Err(malformed(format!("stage {s} has no trees")));
            }
            for tree in &stage.trees {
                if tree.is_empty() {
                    return Err(malformed(format!("stage {s} has an empty tree")));
                }
                for (n, node) in tree.iter().enumerate() {
                    if node.feature >= self.features.len() {
                        return Err(malformed(format!(
                            "stage {s} references missing feature {}",
                            node.feature
                        )));
                    }
                    for branch in [node.left, node.right] {
                        if let Branch::Node(child) = branch {
                            if child <= n || child >= tree.len() {
                                return Err(malformed(format!(
                                    "stage {s} node {n} links to invalid node {child}"
                                )));
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn child<'a, 'i>(node: XmlNode<'a, 'i>, tag: &str) -> Option<XmlNode<'a, 'i>> {
    node.children().find(|n| n.has_tag_name(tag))
}

fn require<'a, 'i>(node: XmlNode<'a, 'i>, tag: &str) -> Result<XmlNode<'a, 'i>, ClassifierLoadError> {
    child(node, tag).ok_or_else(|| malformed(format!("missing <{tag}> in <{}>", node.tag_name().name())))
}

/// `<_>` list items of a sequence node.
fn items<'a, 'i>(node: XmlNode<'a, 'i>) -> impl Iterator<Item = XmlNode<'a, 'i>> {
    node.children().filter(|n| n.has_tag_name("_"))
}

fn numbers<T: FromStr>(node: XmlNode) -> Result<Vec<T>, ClassifierLoadError> {
    node.text()
        .unwrap_or("")
        .split_whitespace()
        .map(|tok| {
            tok.parse::<T>()
                .map_err(|_| malformed(format!("bad number {tok:?} in <{}>", node.tag_name().name())))
        })
        .collect()
}

fn scalar<T: FromStr>(node: XmlNode, tag: &str) -> Result<T, ClassifierLoadError> {
    let values = numbers::<T>(require(node, tag)?)?;
    values
        .into_iter()
        .next()
        .ok_or_else(|| malformed(format!("empty <{tag}>")))
}

fn text_of<'a>(node: XmlNode<'a, '_>, tag: &str) -> Option<&'a str> {
    child(node, tag).and_then(|n| n.text()).map(str::trim)
}

fn parse_rects(node: XmlNode) -> Result<Vec<WeightedRect>, ClassifierLoadError> {
    items(require(node, "rects")?)
        .map(|item| {
            let v = numbers::<f64>(item)?;
            if v.len() != 5 {
                return Err(malformed(format!("rectangle needs 5 values, got {}", v.len())));
            }
            Ok(WeightedRect {
                x: v[0] as i32,
                y: v[1] as i32,
                width: v[2] as i32,
                height: v[3] as i32,
                weight: v[4],
            })
        })
        .collect()
}

fn parse_feature(node: XmlNode) -> Result<HaarFeature, ClassifierLoadError> {
    let tilted = match child(node, "tilted") {
        Some(n) => numbers::<i32>(n)?.first().copied().unwrap_or(0) != 0,
        None => false,
    };
    Ok(HaarFeature {
        rects: parse_rects(node)?,
        tilted,
    })
}

/// `<cascade type_id="opencv-cascade-classifier">`: features are listed once
/// and trees reference them by index. Each internal node is the quadruple
/// `left right feature threshold`, where a child `<= 0` names leaf `-child`.
fn parse_current(node: XmlNode) -> Result<HaarCascade, ClassifierLoadError> {
    if let Some(stage_type) = text_of(node, "stageType") {
        if stage_type != "BOOST" {
            return Err(ClassifierLoadError::Unsupported(format!("stage type {stage_type}")));
        }
    }
    match text_of(node, "featureType") {
        Some("HAAR") => {}
        Some(other) => {
            return Err(ClassifierLoadError::Unsupported(format!("feature type {other}")))
        }
        None => return Err(malformed("missing <featureType>")),
    }
    let window = (scalar::<u32>(node, "width")?, scalar::<u32>(node, "height")?);

    let features = items(require(node, "features")?)
        .map(parse_feature)
        .collect::<Result<Vec<_>, _>>()?;

    let mut stages = Vec::new();
    for stage_node in items(require(node, "stages")?) {
        let threshold = scalar::<f64>(stage_node, "stageThreshold")?;
        let mut trees = Vec::new();
        for weak in items(require(stage_node, "weakClassifiers")?) {
            let internal = numbers::<f64>(require(weak, "internalNodes")?)?;
            let leaves = numbers::<f64>(require(weak, "leafValues")?)?;
            if internal.is_empty() || internal.len() % 4 != 0 {
                return Err(malformed("internalNodes must hold groups of four values"));
            }
            let branch = |raw: f64| -> Result<Branch, ClassifierLoadError> {
                let idx = raw as i64;
                if idx > 0 {
                    Ok(Branch::Node(idx as usize))
                } else {
                    leaves
                        .get((-idx) as usize)
                        .map(|&v| Branch::Leaf(v))
                        .ok_or_else(|| malformed(format!("leaf index {} out of range", -idx)))
                }
            };
            let tree = internal
                .chunks_exact(4)
                .map(|q| {
                    Ok(TreeNode {
                        left: branch(q[0])?,
                        right: branch(q[1])?,
                        feature: q[2] as usize,
                        threshold: q[3],
                    })
                })
                .collect::<Result<Vec<_>, ClassifierLoadError>>()?;
            trees.push(tree);
        }
        stages.push(Stage { threshold, trees });
    }

    Ok(HaarCascade {
        window,
        stages,
        features,
    })
}

/// Legacy `type_id="opencv-haar-classifier"`: every node carries its feature
/// inline, and children are `left_val`/`right_val` leaves or
/// `left_node`/`right_node` indices within the tree.
fn parse_legacy(node: XmlNode) -> Result<HaarCascade, ClassifierLoadError> {
    let size = numbers::<u32>(require(node, "size")?)?;
    if size.len() != 2 {
        return Err(malformed("<size> must hold width and height"));
    }
    let window = (size[0], size[1]);

    let mut features = Vec::new();
    let mut stages = Vec::new();
    for stage_node in items(require(node, "stages")?) {
        let threshold = scalar::<f64>(stage_node, "stage_threshold")?;
        let mut trees = Vec::new();
        for tree_node in items(require(stage_node, "trees")?) {
            let mut tree = Vec::new();
            for xml_node in items(tree_node) {
                features.push(parse_feature(require(xml_node, "feature")?)?);
                tree.push(TreeNode {
                    feature: features.len() - 1,
                    threshold: scalar::<f64>(xml_node, "threshold")?,
                    left: legacy_branch(xml_node, "left_val", "left_node")?,
                    right: legacy_branch(xml_node, "right_val", "right_node")?,
                });
            }
            trees.push(tree);
        }
        stages.push(Stage { threshold, trees });
    }

    Ok(HaarCascade {
        window,
        stages,
        features,
    })
}

fn legacy_branch(node: XmlNode, val_tag: &str, node_tag: &str) -> Result<Branch, ClassifierLoadError> {
    if child(node, val_tag).is_some() {
        Ok(Branch::Leaf(scalar::<f64>(node, val_tag)?))
    } else if child(node, node_tag).is_some() {
        Ok(Branch::Node(scalar::<usize>(node, node_tag)?))
    } else {
        Err(malformed(format!("node needs <{val_tag}> or <{node_tag}>")))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    /// Two single-stump stages on a 20x20 window: the centre must be brighter
    /// than the whole window, and the border ring must stay dark. Uniform
    /// input never passes; a bright square filling the centre does.
    pub(crate) const BRIGHT_SQUARE_CASCADE: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier">
  <stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>20</height>
  <width>20</width>
  <stageNum>2</stageNum>
  <stages>
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>0.</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 0 2.0000000000000001e-01</internalNodes>
          <leafValues>
            -1. 1.</leafValues></_></weakClassifiers></_>
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>0.</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 1 5.0000000000000003e-02</internalNodes>
          <leafValues>
            1. -1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rects>
        <_>
          0 0 20 20 -1.</_>
        <_>
          5 5 10 10 4.</_></rects></_>
    <_>
      <rects>
        <_>
          0 0 20 20 1.</_>
        <_>
          3 3 14 14 -1.</_></rects></_></features></cascade>
</opencv_storage>
"#;

    /// [`BRIGHT_SQUARE_CASCADE`] in the legacy `opencv-haar-classifier`
    /// layout, with each feature inlined in its node.
    pub(crate) const BRIGHT_SQUARE_LEGACY_CASCADE: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<bright_square type_id="opencv-haar-classifier">
  <size>20 20</size>
  <stages>
    <_>
      <trees>
        <_>
          <_>
            <feature>
              <rects>
                <_>0 0 20 20 -1.</_>
                <_>5 5 10 10 4.</_></rects>
              <tilted>0</tilted></feature>
            <threshold>0.2</threshold>
            <left_val>-1.</left_val>
            <right_val>1.</right_val></_></_></trees>
      <stage_threshold>0.</stage_threshold>
      <parent>-1</parent>
      <next>-1</next></_>
    <_>
      <trees>
        <_>
          <_>
            <feature>
              <rects>
                <_>0 0 20 20 1.</_>
                <_>3 3 14 14 -1.</_></rects>
              <tilted>0</tilted></feature>
            <threshold>0.05</threshold>
            <left_val>1.</left_val>
            <right_val>-1.</right_val></_></_></trees>
      <stage_threshold>0.</stage_threshold>
      <parent>0</parent>
      <next>-1</next></_></stages></bright_square>
</opencv_storage>
"#;

    /// Stages of [`BRIGHT_SQUARE_CASCADE`] for [`cascade_xml`].
    pub(crate) fn bright_square_stages() -> Vec<(f64, Vec<(&'static str, &'static str)>)> {
        vec![
            (0.0, vec![("0 -1 0 0.2", "-1 1")]),
            (0.0, vec![("0 -1 1 0.05", "1 -1")]),
        ]
    }

    /// Features of [`BRIGHT_SQUARE_CASCADE`] for [`cascade_xml`].
    pub(crate) fn bright_square_features() -> Vec<(&'static str, bool)> {
        vec![
            ("0 0 20 20 -1; 5 5 10 10 4", false),
            ("0 0 20 20 1; 3 3 14 14 -1", false),
        ]
    }

    /// Builds an `opencv-cascade-classifier` document on a 20x20 window.
    /// Stages are `(threshold, [(internalNodes, leafValues)])`, features are
    /// `(rects, tilted)` with rectangles separated by `;`.
    pub(crate) fn cascade_xml(stages: &[(f64, Vec<(&str, &str)>)], features: &[(&str, bool)]) -> String {
        let mut xml = String::from(
            "<?xml version=\"1.0\"?>\n<opencv_storage>\n<cascade type_id=\"opencv-cascade-classifier\">\n\
             <stageType>BOOST</stageType><featureType>HAAR</featureType>\n\
             <height>20</height><width>20</width>\n<stages>\n",
        );
        for (threshold, trees) in stages {
            xml.push_str(&format!("<_><stageThreshold>{threshold}</stageThreshold><weakClassifiers>\n"));
            for (internal, leaves) in trees {
                xml.push_str(&format!(
                    "<_><internalNodes>{internal}</internalNodes><leafValues>{leaves}</leafValues></_>\n"
                ));
            }
            xml.push_str("</weakClassifiers></_>\n");
        }
        xml.push_str("</stages>\n<features>\n");
        for (rects, tilted) in features {
            xml.push_str("<_><rects>");
            for rect in rects.split(';') {
                xml.push_str(&format!("<_>{}</_>", rect.trim()));
            }
            xml.push_str("</rects>");
            if *tilted {
                xml.push_str("<tilted>1</tilted>");
            }
            xml.push_str("</_>\n");
        }
        xml.push_str("</features></cascade>\n</opencv_storage>\n");
        xml
    }

    const LEGACY_CASCADE: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<legacy_face type_id="opencv-haar-classifier">
  <size>24 24</size>
  <stages>
    <_>
      <!-- stage 0 -->
      <trees>
        <_>
          <!-- tree 0 -->
          <_>
            <!-- root node -->
            <feature>
              <rects>
                <_>0 0 24 24 -1.</_>
                <_>6 6 12 12 4.</_></rects>
              <tilted>0</tilted></feature>
            <threshold>0.1</threshold>
            <left_val>-0.5</left_val>
            <right_node>1</right_node></_>
          <_>
            <!-- node 1 -->
            <feature>
              <rects>
                <_>12 0 6 6 -1.</_>
                <_>12 2 3 3 2.</_></rects>
              <tilted>1</tilted></feature>
            <threshold>0.</threshold>
            <left_val>0.25</left_val>
            <right_val>0.75</right_val></_></_></trees>
      <stage_threshold>0.5</stage_threshold>
      <parent>-1</parent>
      <next>-1</next></_></stages></legacy_face>
</opencv_storage>
"#;

    #[test]
    fn test_parses_current_layout() {
        let cascade = HaarCascade::from_xml_str(BRIGHT_SQUARE_CASCADE).unwrap();
        assert_eq!(cascade.window(), (20, 20));
        assert_eq!(cascade.stage_count(), 2);
        assert!(!cascade.has_tilted_features());

        let stump = &cascade.stages[0].trees[0][0];
        assert_eq!(stump.feature, 0);
        assert_relative_eq!(stump.threshold, 0.2);
        assert_eq!(stump.left, Branch::Leaf(-1.0));
        assert_eq!(stump.right, Branch::Leaf(1.0));
        assert_relative_eq!(cascade.features[0].rects[1].weight, 4.0);
    }

    #[test]
    fn test_parses_legacy_layout() {
        let cascade = HaarCascade::from_xml_str(LEGACY_CASCADE).unwrap();
        assert_eq!(cascade.window(), (24, 24));
        assert_eq!(cascade.stage_count(), 1);
        assert!(cascade.has_tilted_features());

        let tree = &cascade.stages[0].trees[0];
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].left, Branch::Leaf(-0.5));
        assert_eq!(tree[0].right, Branch::Node(1));
        assert_eq!(tree[1].feature, 1);
        assert_eq!(tree[1].right, Branch::Leaf(0.75));
        assert_relative_eq!(cascade.stages[0].threshold, 0.5);
    }

    #[test]
    fn test_builder_matches_bright_square_cascade() {
        let built = HaarCascade::from_xml_str(&cascade_xml(&bright_square_stages(), &bright_square_features())).unwrap();
        let reference = HaarCascade::from_xml_str(BRIGHT_SQUARE_CASCADE).unwrap();
        assert_eq!(built.stages, reference.stages);
        assert_eq!(built.features, reference.features);
    }

    #[test]
    fn test_legacy_layout_matches_current_layout() {
        let legacy = HaarCascade::from_xml_str(BRIGHT_SQUARE_LEGACY_CASCADE).unwrap();
        let current = HaarCascade::from_xml_str(BRIGHT_SQUARE_CASCADE).unwrap();
        assert_eq!(legacy.window(), current.window());
        assert_eq!(legacy.stages, current.stages);
        assert_eq!(legacy.features, current.features);
    }

    /// Root splits on window brightness, its left child on left-minus-right
    /// contrast, so each of the three leaves is reachable.
    fn two_level_tree_cascade() -> HaarCascade {
        let xml = cascade_xml(
            &[(0.0, vec![("1 0 0 0.6 -1 -2 1 0.1", "0.3 -0.7 0.9")])],
            &[("0 0 20 20 1", false), ("0 0 10 20 1; 10 0 10 20 -1", false)],
        );
        HaarCascade::from_xml_str(&xml).unwrap()
    }

    #[test]
    fn test_parses_positive_child_links() {
        let cascade = two_level_tree_cascade();
        let tree = &cascade.stages[0].trees[0];
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].left, Branch::Node(1));
        assert_eq!(tree[0].right, Branch::Leaf(0.3));
        assert_eq!(tree[1].feature, 1);
        assert_eq!(tree[1].left, Branch::Leaf(-0.7));
        assert_eq!(tree[1].right, Branch::Leaf(0.9));
    }

    #[test]
    fn test_tree_walk_reaches_every_leaf() {
        use image::{GrayImage, Luma};

        let cascade = two_level_tree_cascade();
        let tree = &cascade.stages[0].trees[0];
        let inv_norm = 1.0 / (400.0 * 255.0);
        let walk = |img: &GrayImage| {
            let ii = IntegralImage::new(img, false);
            cascade.walk_tree(tree, &ii, 0, 0, inv_norm)
        };

        let white = GrayImage::from_pixel(20, 20, Luma([255]));
        let black = GrayImage::from_pixel(20, 20, Luma([0]));
        let left_lit = GrayImage::from_fn(20, 20, |x, _| Luma([if x < 10 { 255 } else { 0 }]));

        assert_relative_eq!(walk(&white), 0.3);
        assert_relative_eq!(walk(&black), -0.7);
        assert_relative_eq!(walk(&left_lit), 0.9);
    }

    #[test]
    fn test_tilted_feature_uses_rotated_sums() {
        use image::{GrayImage, Luma};

        let xml = cascade_xml(&[(0.0, vec![("0 -1 0 0.5", "-1 1")])], &[("10 2 4 4 1", true)]);
        let cascade = HaarCascade::from_xml_str(&xml).unwrap();
        assert!(cascade.has_tilted_features());
        let tree = &cascade.stages[0].trees[0];

        let white = GrayImage::from_pixel(20, 20, Luma([255]));
        let black = GrayImage::from_pixel(20, 20, Luma([0]));
        let with_tilted = IntegralImage::new(&white, true);
        assert_relative_eq!(cascade.walk_tree(tree, &with_tilted, 0, 0, 1.0), 1.0);
        assert!(cascade.evaluate(&with_tilted, 0, 0, 1.0));

        let dark = IntegralImage::new(&black, true);
        assert_relative_eq!(cascade.walk_tree(tree, &dark, 0, 0, 1.0), -1.0);
        assert!(!cascade.evaluate(&dark, 0, 0, 1.0));
    }

    #[test]
    fn test_evaluate_rejects_when_any_stage_fails() {
        use image::{GrayImage, Luma};

        let mut stages = bright_square_stages();
        stages.push((1e9, vec![("0 -1 0 0.2", "-1 1")]));
        let cascade = HaarCascade::from_xml_str(&cascade_xml(&stages, &bright_square_features())).unwrap();
        let passing = HaarCascade::from_xml_str(BRIGHT_SQUARE_CASCADE).unwrap();

        let square = GrayImage::from_fn(20, 20, |x, y| {
            Luma([if (5..15).contains(&x) && (5..15).contains(&y) { 255 } else { 0 }])
        });
        let ii = IntegralImage::new(&square, false);
        let nf = (324.0 * ii.rect_sq_sum(1, 1, 18, 18) - ii.rect_sum(1, 1, 18, 18).powi(2)).sqrt();
        assert!(passing.evaluate(&ii, 0, 0, 1.0 / nf));
        assert!(!cascade.evaluate(&ii, 0, 0, 1.0 / nf));
    }

    #[test]
    fn test_load_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cascade.xml");
        std::fs::write(&path, BRIGHT_SQUARE_CASCADE).unwrap();
        assert_eq!(HaarCascade::load(&path).unwrap().stage_count(), 2);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let result = HaarCascade::load(&tmp.path().join("absent.xml"));
        assert!(matches!(result, Err(ClassifierLoadError::Io { .. })));
    }

    #[test]
    fn test_rejects_non_xml() {
        let result = HaarCascade::from_xml_str("not a cascade");
        assert!(matches!(result, Err(ClassifierLoadError::Xml(_))));
    }

    #[test]
    fn test_rejects_lbp_cascade() {
        let xml = BRIGHT_SQUARE_CASCADE.replace(
            "<featureType>HAAR</featureType>",
            "<featureType>LBP</featureType>",
        );
        let result = HaarCascade::from_xml_str(&xml);
        assert!(matches!(result, Err(ClassifierLoadError::Unsupported(_))));
    }

    #[test]
    fn test_rejects_rect_outside_window() {
        let xml = BRIGHT_SQUARE_CASCADE.replace("5 5 10 10 4.", "15 15 10 10 4.");
        let result = HaarCascade::from_xml_str(&xml);
        assert!(matches!(result, Err(ClassifierLoadError::Malformed(_))));
    }

    #[test]
    fn test_rejects_leaf_index_out_of_range() {
        let xml = BRIGHT_SQUARE_CASCADE.replacen("0 -1 0 2.0000000000000001e-01", "0 -3 0 0.2", 1);
        let result = HaarCascade::from_xml_str(&xml);
        assert!(matches!(result, Err(ClassifierLoadError::Malformed(_))));
    }

    #[test]
    fn test_rejects_missing_feature() {
        let xml = BRIGHT_SQUARE_CASCADE.replacen("0 -1 1 5.0000000000000003e-02", "0 -1 7 0.05", 1);
        let result = HaarCascade::from_xml_str(&xml);
        assert!(matches!(result, Err(ClassifierLoadError::Malformed(_))));
    }

    #[test]
    fn test_rejects_document_without_cascade() {
        let result = HaarCascade::from_xml_str("<opencv_storage><x>1</x></opencv_storage>");
        assert!(matches!(result, Err(ClassifierLoadError::Malformed(_))));
    }
}
