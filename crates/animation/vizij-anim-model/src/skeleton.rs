//! Skeleton: bone hierarchy, reference pose, virtual bones and the curve-name registry.
//!
//! Curves that reference a named skeleton parameter resolve to a `CurveId` once
//! and keep it; the registry only ever grows.

use hashbrown::HashMap;
use indexmap::IndexMap;
use md5::{Digest, Md5};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::ids::{BoneIndex, CurveId, IdAllocator};
use crate::math::Transform;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bone {
    pub name: String,
    /// Parent bone index; parents always precede their children.
    #[serde(default)]
    pub parent: Option<u32>,
    #[serde(default)]
    pub ref_pose: Transform,
}

/// A derived bone: `target` expressed in the space of `source`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VirtualBone {
    pub name: String,
    pub source: BoneIndex,
    pub target: BoneIndex,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VirtualBoneDesc {
    pub name: String,
    pub source: String,
    pub target: String,
}

/// Serializable skeleton description (fixtures, host import).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SkeletonDesc {
    pub name: String,
    pub bones: Vec<Bone>,
    #[serde(default, rename = "virtualBones")]
    pub virtual_bones: Vec<VirtualBoneDesc>,
    /// Curve names registered up front, in id order.
    #[serde(default)]
    pub curves: Vec<String>,
}

#[derive(Debug, Default)]
struct CurveRegistry {
    ids: IdAllocator,
    by_name: IndexMap<String, CurveId>,
}

#[derive(Debug)]
pub struct Skeleton {
    name: String,
    bones: Vec<Bone>,
    virtual_bones: Vec<VirtualBone>,
    bone_lookup: HashMap<String, BoneIndex>,
    curves: RwLock<CurveRegistry>,
}

impl Skeleton {
    /// Build and validate a skeleton from its description.
    pub fn from_desc(desc: SkeletonDesc) -> Result<Self, ModelError> {
        let invalid = |reason: String| ModelError::InvalidSkeleton { reason };
        if desc.bones.is_empty() {
            return Err(invalid(format!("skeleton '{}' has no bones", desc.name)));
        }

        let mut bone_lookup = HashMap::with_capacity(desc.bones.len());
        for (idx, bone) in desc.bones.iter().enumerate() {
            if bone.name.is_empty() {
                return Err(invalid(format!("bone {idx} has an empty name")));
            }
            match bone.parent {
                Some(p) if p as usize >= idx => {
                    return Err(invalid(format!(
                        "bone '{}' has parent {p} which does not precede it",
                        bone.name
                    )));
                }
                None if idx != 0 => {
                    return Err(invalid(format!(
                        "bone '{}' has no parent; only bone 0 may be a root",
                        bone.name
                    )));
                }
                _ => {}
            }
            if !bone.ref_pose.is_finite() {
                return Err(invalid(format!("bone '{}' has a non-finite ref pose", bone.name)));
            }
            if bone_lookup
                .insert(bone.name.clone(), BoneIndex(idx as u32))
                .is_some()
            {
                return Err(invalid(format!("duplicate bone name '{}'", bone.name)));
            }
        }

        let mut virtual_bones = Vec::with_capacity(desc.virtual_bones.len());
        for vb in desc.virtual_bones {
            if bone_lookup.contains_key(&vb.name)
                || virtual_bones.iter().any(|v: &VirtualBone| v.name == vb.name)
            {
                return Err(invalid(format!("duplicate virtual bone name '{}'", vb.name)));
            }
            let resolve = |name: &str| {
                bone_lookup
                    .get(name)
                    .copied()
                    .ok_or_else(|| invalid(format!("virtual bone '{}' references '{name}'", vb.name)))
            };
            let source = resolve(&vb.source)?;
            let target = resolve(&vb.target)?;
            virtual_bones.push(VirtualBone {
                name: vb.name,
                source,
                target,
            });
        }

        let skeleton = Self {
            name: desc.name,
            bones: desc.bones,
            virtual_bones,
            bone_lookup,
            curves: RwLock::new(CurveRegistry::default()),
        };
        for curve in &desc.curves {
            skeleton.resolve_curve(curve);
        }
        Ok(skeleton)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    #[inline]
    pub fn num_bones(&self) -> usize {
        self.bones.len()
    }

    pub fn virtual_bones(&self) -> &[VirtualBone] {
        &self.virtual_bones
    }

    /// Skeleton index of a virtual bone (after all real bones).
    #[inline]
    pub fn virtual_bone_index(&self, virtual_idx: usize) -> BoneIndex {
        BoneIndex((self.bones.len() + virtual_idx) as u32)
    }

    pub fn find_bone(&self, name: &str) -> Option<BoneIndex> {
        self.bone_lookup.get(name).copied()
    }

    /// Name of a real or virtual bone.
    pub fn bone_name(&self, index: BoneIndex) -> Option<&str> {
        let idx = index.as_usize();
        if let Some(bone) = self.bones.get(idx) {
            return Some(&bone.name);
        }
        self.virtual_bones
            .get(idx.wrapping_sub(self.bones.len()))
            .map(|vb| vb.name.as_str())
    }

    pub fn ref_pose(&self, index: BoneIndex) -> Option<Transform> {
        self.bones.get(index.as_usize()).map(|b| b.ref_pose)
    }

    /// Reference pose of every real bone, in skeleton order.
    pub fn ref_pose_locals(&self) -> Vec<Transform> {
        self.bones.iter().map(|b| b.ref_pose).collect()
    }

    /// Convert local transforms (one per real bone) into component space.
    pub fn component_space(&self, locals: &[Transform]) -> Vec<Transform> {
        let mut out: Vec<Transform> = Vec::with_capacity(locals.len());
        for (idx, local) in locals.iter().enumerate() {
            let cs = match self.bones.get(idx).and_then(|b| b.parent) {
                Some(parent) => local.then(&out[parent as usize]),
                None => *local,
            };
            out.push(cs);
        }
        out
    }

    /// Stable id for a curve name, registering it on first use.
    pub fn resolve_curve(&self, name: &str) -> CurveId {
        if let Some(id) = self.curves.read().by_name.get(name) {
            return *id;
        }
        let mut reg = self.curves.write();
        if let Some(id) = reg.by_name.get(name) {
            return *id;
        }
        let id = reg.ids.alloc_curve();
        reg.by_name.insert(name.to_string(), id);
        log::debug!("skeleton '{}': registered curve '{}' as {:?}", self.name, name, id);
        id
    }

    pub fn find_curve(&self, name: &str) -> Option<CurveId> {
        self.curves.read().by_name.get(name).copied()
    }

    pub fn curve_name(&self, id: CurveId) -> Option<String> {
        self.curves
            .read()
            .by_name
            .iter()
            .find_map(|(name, cid)| (*cid == id).then(|| name.clone()))
    }

    /// Content hash of the skeleton's identity: bone names, parents and the virtual-bone set,
    /// in skeleton index order.
    pub fn identity_hash(&self) -> [u8; 16] {
        let mut hasher = Md5::new();
        hasher.update(b"skeleton");
        hasher.update(&(self.bones.len() as u64).to_le_bytes());
        for bone in &self.bones {
            hash_str(&mut hasher, &bone.name);
            let parent = bone.parent.map(|p| p as i64).unwrap_or(-1);
            hasher.update(&parent.to_le_bytes());
        }
        hasher.update(&(self.virtual_bones.len() as u64).to_le_bytes());
        for vb in &self.virtual_bones {
            hash_str(&mut hasher, &vb.name);
            hasher.update(&vb.source.0.to_le_bytes());
            hasher.update(&vb.target.0.to_le_bytes());
        }
        hasher.finalize().into()
    }
}

fn hash_str(hasher: &mut Md5, s: &str) {
    hasher.update(&(s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}
