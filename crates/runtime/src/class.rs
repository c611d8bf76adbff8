//! Nominal classes, tag constructors and traits.
//!
//! A class records its member tables (instance fields, methods, getters,
//! setters, and their static counterparts), its super class and trait
//! list, and two offset vectors caching the result of member resolution
//! as a packed `(flags << 24) | slot` word.
//!
//! Before a class is first instantiated it is *finalised*: supers and
//! traits are resolved, inherited members are copied into the class's own
//! tables, trait implementation bits are filled transitively, `init` is
//! captured as the constructor and `__free__` as the finalizer.
//! Finalisation is idempotent; a cyclic super graph aborts it.

use crate::value::{Raw, Value};
use indexmap::IndexMap;
use quill_core::intern::{InternId, InternSet};

pub type ClassId = usize;

// Builtin class ids, installed in this order by `ClassRegistry::new`.
pub const CLASS_TOP: ClassId = 0;
pub const CLASS_CLASS: ClassId = 1;
pub const CLASS_FUNCTION: ClassId = 2;
pub const CLASS_ARRAY: ClassId = 3;
pub const CLASS_DICT: ClassId = 4;
pub const CLASS_STRING: ClassId = 5;
pub const CLASS_INT: ClassId = 6;
pub const CLASS_FLOAT: ClassId = 7;
pub const CLASS_BOOL: ClassId = 8;
pub const CLASS_BLOB: ClassId = 9;
pub const CLASS_REGEX: ClassId = 10;
pub const CLASS_GENERATOR: ClassId = 11;
pub const CLASS_THREAD: ClassId = 12;
pub const CLASS_CHANNEL: ClassId = 13;
pub const CLASS_TUPLE: ClassId = 14;
pub const CLASS_NIL: ClassId = 15;
pub const CLASS_TAG: ClassId = 16;
pub const CLASS_BOTTOM: ClassId = 17;
pub const CLASS_MUTEX: ClassId = 18;
pub const CLASS_CONDVAR: ClassId = 19;
/// `Iter` trait: answered by anything with a `__next__`.
pub const TRAIT_ITER: ClassId = 20;
/// `Iterable` trait: answered by anything with an `__iter__`.
pub const TRAIT_ITERABLE: ClassId = 21;

const BUILTIN_CLASS_NAMES: &[&str] = &[
    "Object", "Class", "Function", "Array", "Dict", "String", "Int", "Float",
    "Bool", "Blob", "Regex", "Generator", "Thread", "Channel", "Tuple", "Nil",
    "Tag", "Bottom", "Mutex", "CondVar", "Iter", "Iterable",
];

/// Member-kind flags packed into the high byte of an offset word.
const FLAG_FIELD: u32 = 1;
const FLAG_METHOD: u32 = 2;
const FLAG_GETTER: u32 = 3;
const FLAG_SETTER: u32 = 4;
const OFFSET_SHIFT: u32 = 24;

/// Cached negative answer: the class does not provide the member.
const CACHED_MISS: u32 = u32::MAX;

/// What a member lookup resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Field(usize),
    Method,
    Getter,
    Setter,
}

#[derive(Debug, Default)]
pub struct Class {
    pub id: ClassId,
    pub name: String,
    pub super_: Option<ClassId>,
    pub traits: Vec<ClassId>,
    pub is_trait: bool,
    pub trait_index: Option<u32>,
    /// Trait implementation bit-vector, indexed by trait-index.
    trait_bits: Vec<u64>,
    /// Instance field name -> slot index. Insertion order is the layout.
    pub fields: IndexMap<InternId, usize>,
    pub methods: IndexMap<InternId, Value>,
    pub getters: IndexMap<InternId, Value>,
    pub setters: IndexMap<InternId, Value>,
    pub statics: IndexMap<InternId, Value>,
    pub static_methods: IndexMap<InternId, Value>,
    pub finalizer: Option<Value>,
    pub init: Option<Value>,
    /// Packed member-offset cache, indexed by intern id.
    offsets: Vec<u32>,
    static_offsets: Vec<u32>,
    pub finalized: bool,
}

impl Class {
    fn pack(kind: u32, index: usize) -> u32 {
        (kind << OFFSET_SHIFT) | (index as u32 + 1)
    }

    fn unpack(word: u32) -> Option<MemberKind> {
        if word == 0 || word == CACHED_MISS {
            return None;
        }
        let index = (word & 0x00ff_ffff) as usize - 1;
        match word >> OFFSET_SHIFT {
            FLAG_FIELD => Some(MemberKind::Field(index)),
            FLAG_METHOD => Some(MemberKind::Method),
            FLAG_GETTER => Some(MemberKind::Getter),
            FLAG_SETTER => Some(MemberKind::Setter),
            _ => None,
        }
    }

    pub fn implements(&self, trait_index: u32) -> bool {
        let word = (trait_index / 64) as usize;
        word < self.trait_bits.len() && self.trait_bits[word] & (1 << (trait_index % 64)) != 0
    }

    fn set_trait_bit(&mut self, trait_index: u32) {
        let word = (trait_index / 64) as usize;
        if self.trait_bits.len() <= word {
            self.trait_bits.resize(word + 1, 0);
        }
        self.trait_bits[word] |= 1 << (trait_index % 64);
    }
}

/// Declaration handed to `class_new` by the VM's DEFINE_CLASS handler.
#[derive(Debug, Clone, Default)]
pub struct ClassDecl {
    pub name: String,
    pub super_: Option<ClassId>,
    pub traits: Vec<ClassId>,
    pub is_trait: bool,
    pub fields: Vec<InternId>,
}

#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: Vec<Class>,
    next_trait_index: u32,
}

impl ClassRegistry {
    /// Build a registry with the builtin classes pre-installed at their
    /// fixed ids.
    pub fn new(members: &mut InternSet) -> Self {
        let mut reg = ClassRegistry { classes: Vec::new(), next_trait_index: 0 };
        for name in BUILTIN_CLASS_NAMES {
            // Builtin names participate in interning like any member.
            members.intern(name);
            let is_trait = matches!(*name, "Iter" | "Iterable");
            reg.class_new(ClassDecl {
                name: name.to_string(),
                is_trait,
                ..ClassDecl::default()
            });
        }
        reg
    }

    pub fn count(&self) -> usize {
        self.classes.len()
    }

    pub fn get(&self, id: ClassId) -> &Class {
        &self.classes[id]
    }

    pub fn name(&self, id: ClassId) -> &str {
        &self.classes[id].name
    }

    /// Allocate a class with a fresh monotonically increasing id.
    pub fn class_new(&mut self, decl: ClassDecl) -> ClassId {
        let id = self.classes.len();
        let mut c = Class {
            id,
            name: decl.name,
            super_: decl.super_,
            traits: decl.traits,
            is_trait: decl.is_trait,
            ..Class::default()
        };
        if c.is_trait {
            c.trait_index = Some(self.next_trait_index);
            c.set_trait_bit(self.next_trait_index);
            self.next_trait_index += 1;
        }
        for f in decl.fields {
            let slot = c.fields.len();
            c.fields.entry(f).or_insert(slot);
        }
        self.classes.push(c);
        id
    }

    /// Record that `c` implements trait `t`, pulling in `t`'s own
    /// implemented traits transitively.
    pub fn implement_trait(&mut self, c: ClassId, t: ClassId) {
        let bits = self.classes[t].trait_bits.clone();
        let cls = &mut self.classes[c];
        if cls.trait_bits.len() < bits.len() {
            cls.trait_bits.resize(bits.len(), 0);
        }
        for (i, w) in bits.iter().enumerate() {
            cls.trait_bits[i] |= w;
        }
    }

    /// Nominal subtype check. `Top` is above everything, `Bottom` below
    /// everything; `Nil` is sub only of itself and `Top`; a trait is
    /// answered through the implementation bit-vector in O(1).
    pub fn is_subclass(&self, sub: ClassId, sup: ClassId) -> bool {
        if sub == sup || sup == CLASS_TOP || sub == CLASS_BOTTOM {
            return true;
        }
        if sub == CLASS_NIL || sub == CLASS_TOP {
            return false;
        }
        if let Some(ti) = self.classes[sup].trait_index
            && self.classes[sub].implements(ti)
        {
            return true;
        }
        let mut cur = self.classes[sub].super_;
        while let Some(c) = cur {
            if c == sup {
                return true;
            }
            cur = self.classes[c].super_;
        }
        false
    }

    /// Breadth-first union of super/trait member tables into `c`,
    /// without overwriting local definitions.
    pub fn resolve_all(&mut self, c: ClassId) {
        let mut queue: Vec<ClassId> = Vec::new();
        if let Some(s) = self.classes[c].super_ {
            queue.push(s);
        }
        queue.extend(self.classes[c].traits.iter().copied());
        let mut seen = vec![c];
        let mut i = 0;
        while i < queue.len() {
            let anc = queue[i];
            i += 1;
            if seen.contains(&anc) {
                continue;
            }
            seen.push(anc);
            if let Some(s) = self.classes[anc].super_ {
                queue.push(s);
            }
            queue.extend(self.classes[anc].traits.iter().copied());

            let (fields, methods, getters, setters, statics, static_methods) = {
                let a = &self.classes[anc];
                (
                    a.fields.keys().copied().collect::<Vec<_>>(),
                    a.methods.clone(),
                    a.getters.clone(),
                    a.setters.clone(),
                    a.statics.clone(),
                    a.static_methods.clone(),
                )
            };
            let cls = &mut self.classes[c];
            for f in fields {
                let slot = cls.fields.len();
                cls.fields.entry(f).or_insert(slot);
            }
            for (k, v) in methods {
                cls.methods.entry(k).or_insert(v);
            }
            for (k, v) in getters {
                cls.getters.entry(k).or_insert(v);
            }
            for (k, v) in setters {
                cls.setters.entry(k).or_insert(v);
            }
            for (k, v) in statics {
                cls.statics.entry(k).or_insert(v);
            }
            for (k, v) in static_methods {
                cls.static_methods.entry(k).or_insert(v);
            }
        }
    }

    /// Finalise `c`: resolve inheritance, fill trait bits, capture the
    /// constructor and finalizer, reset the offset caches. Idempotent.
    pub fn finalize(&mut self, c: ClassId, names: &FinalizeNames) -> Result<(), String> {
        if self.classes[c].finalized {
            return Ok(());
        }
        // Cyclic super graphs abort finalisation.
        let mut cur = self.classes[c].super_;
        let mut steps = 0;
        while let Some(s) = cur {
            if s == c || steps > self.classes.len() {
                return Err(format!("cyclic superclass chain through '{}'", self.classes[c].name));
            }
            cur = self.classes[s].super_;
            steps += 1;
        }

        // Finalise ancestors first so copied tables are complete.
        if let Some(s) = self.classes[c].super_ {
            self.finalize(s, names)?;
        }
        for t in self.classes[c].traits.clone() {
            self.finalize(t, names)?;
            self.implement_trait(c, t);
        }
        if let Some(s) = self.classes[c].super_ {
            let bits = self.classes[s].trait_bits.clone();
            let cls = &mut self.classes[c];
            if cls.trait_bits.len() < bits.len() {
                cls.trait_bits.resize(bits.len(), 0);
            }
            for (i, w) in bits.iter().enumerate() {
                cls.trait_bits[i] |= w;
            }
        }

        self.resolve_all(c);

        let cls = &mut self.classes[c];
        cls.init = cls.methods.get(&names.init).cloned();
        cls.finalizer = cls.methods.get(&names.free).cloned();
        cls.offsets.clear();
        cls.static_offsets.clear();
        cls.finalized = true;
        Ok(())
    }

    /// The compiled constructor; finalises on first access.
    pub fn ctor(&mut self, c: ClassId, names: &FinalizeNames) -> Result<Option<Value>, String> {
        self.finalize(c, names)?;
        Ok(self.classes[c].init.clone())
    }

    pub fn finalizer(&self, c: ClassId) -> Option<Value> {
        self.classes[c].finalizer.clone()
    }

    pub fn n_fields(&self, c: ClassId) -> usize {
        self.classes[c].fields.len()
    }

    fn cached(&self, c: ClassId, id: InternId, statics: bool) -> Option<Option<MemberKind>> {
        let cache = if statics { &self.classes[c].static_offsets } else { &self.classes[c].offsets };
        match cache.get(id as usize) {
            Some(&w) if w == CACHED_MISS => Some(None),
            Some(&w) if w != 0 => Some(Class::unpack(w)),
            _ => None,
        }
    }

    fn cache_store(&mut self, c: ClassId, id: InternId, statics: bool, word: u32) {
        let cache = if statics {
            &mut self.classes[c].static_offsets
        } else {
            &mut self.classes[c].offsets
        };
        if cache.len() <= id as usize {
            cache.resize(id as usize + 1, 0);
        }
        cache[id as usize] = word;
    }

    /// Resolve a member on `c`, consulting and updating the offset
    /// cache. Walks super and traits breadth-first on a cold miss.
    pub fn lookup_member(&mut self, c: ClassId, id: InternId) -> Option<MemberKind> {
        if let Some(hit) = self.cached(c, id, false) {
            return hit;
        }
        let answer = self.walk_member(c, id);
        let word = match answer {
            Some(MemberKind::Field(slot)) => Class::pack(FLAG_FIELD, slot),
            Some(MemberKind::Method) => Class::pack(FLAG_METHOD, 0),
            Some(MemberKind::Getter) => Class::pack(FLAG_GETTER, 0),
            Some(MemberKind::Setter) => Class::pack(FLAG_SETTER, 0),
            None => CACHED_MISS,
        };
        self.cache_store(c, id, false, word);
        answer
    }

    fn walk_member(&mut self, c: ClassId, id: InternId) -> Option<MemberKind> {
        let mut queue = vec![c];
        let mut i = 0;
        while i < queue.len() {
            let cur = queue[i];
            i += 1;
            let cls = &self.classes[cur];
            if let Some(slot) = cls.fields.get(&id) {
                return Some(MemberKind::Field(*slot));
            }
            if cls.getters.contains_key(&id) {
                return Some(MemberKind::Getter);
            }
            if cls.methods.contains_key(&id) {
                return Some(MemberKind::Method);
            }
            if let Some(s) = cls.super_ {
                queue.push(s);
            }
            queue.extend(cls.traits.iter().copied());
        }
        None
    }

    /// Resolve an instance method (only), walking inheritance through
    /// the same cache discipline.
    pub fn lookup_method(&mut self, c: ClassId, id: InternId) -> Option<Value> {
        match self.lookup_member(c, id) {
            Some(MemberKind::Method) => self.find_in_tables(c, id, |cls| &cls.methods),
            _ => None,
        }
    }

    pub fn lookup_getter(&mut self, c: ClassId, id: InternId) -> Option<Value> {
        match self.lookup_member(c, id) {
            Some(MemberKind::Getter) => self.find_in_tables(c, id, |cls| &cls.getters),
            _ => None,
        }
    }

    pub fn lookup_setter(&mut self, c: ClassId, id: InternId) -> Option<Value> {
        let mut queue = vec![c];
        let mut i = 0;
        while i < queue.len() {
            let cur = queue[i];
            i += 1;
            let cls = &self.classes[cur];
            if let Some(v) = cls.setters.get(&id) {
                return Some(v.clone());
            }
            if let Some(s) = cls.super_ {
                queue.push(s);
            }
            queue.extend(cls.traits.iter().copied());
        }
        None
    }

    /// Static member lookup (fields then methods), cached separately.
    pub fn lookup_static(&mut self, c: ClassId, id: InternId) -> Option<Value> {
        let mut queue = vec![c];
        let mut i = 0;
        while i < queue.len() {
            let cur = queue[i];
            i += 1;
            let cls = &self.classes[cur];
            if let Some(v) = cls.statics.get(&id) {
                return Some(v.clone());
            }
            if let Some(v) = cls.static_methods.get(&id) {
                return Some(v.clone());
            }
            if let Some(s) = cls.super_ {
                queue.push(s);
            }
            queue.extend(cls.traits.iter().copied());
        }
        None
    }

    pub fn field_slot(&mut self, c: ClassId, id: InternId) -> Option<usize> {
        match self.lookup_member(c, id) {
            Some(MemberKind::Field(slot)) => Some(slot),
            _ => None,
        }
    }

    fn find_in_tables(
        &self,
        c: ClassId,
        id: InternId,
        table: impl Fn(&Class) -> &IndexMap<InternId, Value>,
    ) -> Option<Value> {
        let mut queue = vec![c];
        let mut i = 0;
        while i < queue.len() {
            let cur = queue[i];
            i += 1;
            let cls = &self.classes[cur];
            if let Some(v) = table(cls).get(&id) {
                return Some(v.clone());
            }
            if let Some(s) = cls.super_ {
                queue.push(s);
            }
            queue.extend(cls.traits.iter().copied());
        }
        None
    }

    /// Install a member definition, invalidating the offset caches of
    /// the class (sub classes pick the change up only before their own
    /// finalisation, as in the original).
    pub fn bind(&mut self, c: ClassId, id: InternId, kind: BindKind, v: Value) {
        let cls = &mut self.classes[c];
        match kind {
            BindKind::Instance => {
                cls.methods.insert(id, v);
            }
            BindKind::Getter => {
                cls.getters.insert(id, v);
            }
            BindKind::Setter => {
                cls.setters.insert(id, v);
            }
            BindKind::Static => {
                cls.statics.insert(id, v);
            }
        }
        cls.offsets.clear();
        cls.static_offsets.clear();
    }

    pub fn set_static(&mut self, c: ClassId, id: InternId, v: Value) {
        self.classes[c].statics.insert(id, v);
    }

    /// Every value held in static slots, method tables and captured
    /// ctors/finalizers; these are GC roots.
    pub fn root_values(&self) -> impl Iterator<Item = &Value> {
        self.classes.iter().flat_map(|c| {
            c.statics
                .values()
                .chain(c.static_methods.values())
                .chain(c.methods.values())
                .chain(c.getters.values())
                .chain(c.setters.values())
                .chain(c.init.iter())
                .chain(c.finalizer.iter())
        })
    }
}

/// Pre-interned names consulted during finalisation.
#[derive(Debug, Clone, Copy)]
pub struct FinalizeNames {
    pub init: InternId,
    pub free: InternId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindKind {
    Instance,
    Getter,
    Setter,
    Static,
}

/// The class a value dispatches through.
pub fn class_of(v: &Value) -> ClassId {
    match &v.raw {
        Raw::Int(_) => CLASS_INT,
        Raw::Real(_) => CLASS_FLOAT,
        Raw::Bool(_) => CLASS_BOOL,
        Raw::Str(_) => CLASS_STRING,
        Raw::Array(_) => CLASS_ARRAY,
        Raw::Dict(_) => CLASS_DICT,
        Raw::Blob(_) => CLASS_BLOB,
        Raw::Tuple(_) => CLASS_TUPLE,
        Raw::Object { class, .. } => *class,
        Raw::Class(_) => CLASS_CLASS,
        Raw::Tag(_) => CLASS_TAG,
        Raw::Function { .. } | Raw::Method { .. } | Raw::BuiltinFn(_) | Raw::BuiltinMethod { .. } => {
            CLASS_FUNCTION
        }
        Raw::Generator(_) => CLASS_GENERATOR,
        Raw::Thread(_) => CLASS_THREAD,
        Raw::Channel(_) => CLASS_CHANNEL,
        Raw::Mutex(_) => CLASS_MUTEX,
        Raw::CondVar(_) => CLASS_CONDVAR,
        Raw::Regex(_) => CLASS_REGEX,
        Raw::Nil => CLASS_NIL,
        _ => CLASS_TOP,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::intern::InternSet;

    fn setup() -> (ClassRegistry, InternSet, FinalizeNames) {
        let mut members = InternSet::new();
        let reg = ClassRegistry::new(&mut members);
        let names = FinalizeNames {
            init: members.intern("init"),
            free: members.intern("__free__"),
        };
        (reg, members, names)
    }

    #[test]
    fn test_builtin_ids_are_fixed() {
        let (reg, _, _) = setup();
        assert_eq!(reg.name(CLASS_TOP), "Object");
        assert_eq!(reg.name(CLASS_STRING), "String");
        assert_eq!(reg.name(TRAIT_ITERABLE), "Iterable");
        assert!(reg.get(TRAIT_ITER).is_trait);
    }

    #[test]
    fn test_subclass_chain() {
        let (mut reg, _, _) = setup();
        let a = reg.class_new(ClassDecl { name: "A".into(), ..ClassDecl::default() });
        let b = reg.class_new(ClassDecl { name: "B".into(), super_: Some(a), ..ClassDecl::default() });
        assert!(reg.is_subclass(b, a));
        assert!(reg.is_subclass(b, CLASS_TOP));
        assert!(reg.is_subclass(CLASS_BOTTOM, b));
        assert!(!reg.is_subclass(a, b));
        assert!(!reg.is_subclass(CLASS_NIL, a));
        assert!(reg.is_subclass(CLASS_NIL, CLASS_TOP));
    }

    #[test]
    fn test_trait_bits_answer_in_o1() {
        let (mut reg, _, names) = setup();
        let t = reg.class_new(ClassDecl { name: "Show".into(), is_trait: true, ..ClassDecl::default() });
        let c = reg.class_new(ClassDecl {
            name: "Point".into(),
            traits: vec![t],
            ..ClassDecl::default()
        });
        reg.finalize(c, &names).unwrap();
        assert!(reg.is_subclass(c, t));
    }

    #[test]
    fn test_finalize_copies_inherited_members() {
        let (mut reg, mut members, names) = setup();
        let greet = members.intern("greet");
        let a = reg.class_new(ClassDecl { name: "A".into(), ..ClassDecl::default() });
        reg.bind(a, greet, BindKind::Instance, Value::int(1));
        let b = reg.class_new(ClassDecl { name: "B".into(), super_: Some(a), ..ClassDecl::default() });
        reg.finalize(b, &names).unwrap();
        assert!(reg.get(b).methods.contains_key(&greet));
        assert_eq!(reg.lookup_member(b, greet), Some(MemberKind::Method));
    }

    #[test]
    fn test_field_layout_includes_super_fields() {
        let (mut reg, mut members, names) = setup();
        let x = members.intern("x");
        let y = members.intern("y");
        let a = reg.class_new(ClassDecl { name: "A".into(), fields: vec![x], ..ClassDecl::default() });
        let b = reg.class_new(ClassDecl {
            name: "B".into(),
            super_: Some(a),
            fields: vec![y],
            ..ClassDecl::default()
        });
        reg.finalize(b, &names).unwrap();
        assert_eq!(reg.n_fields(b), 2);
        let sx = reg.field_slot(b, x).unwrap();
        let sy = reg.field_slot(b, y).unwrap();
        assert_ne!(sx, sy);
    }

    #[test]
    fn test_cyclic_super_rejected() {
        let (mut reg, _, names) = setup();
        let a = reg.class_new(ClassDecl { name: "A".into(), ..ClassDecl::default() });
        let b = reg.class_new(ClassDecl { name: "B".into(), super_: Some(a), ..ClassDecl::default() });
        reg.classes[a].super_ = Some(b);
        assert!(reg.finalize(a, &names).is_err());
    }

    #[test]
    fn test_offset_cache_matches_walk() {
        let (mut reg, mut members, names) = setup();
        let m = members.intern("area");
        let a = reg.class_new(ClassDecl { name: "Shape".into(), ..ClassDecl::default() });
        reg.bind(a, m, BindKind::Instance, Value::int(7));
        let b = reg.class_new(ClassDecl { name: "Circle".into(), super_: Some(a), ..ClassDecl::default() });
        reg.finalize(b, &names).unwrap();
        // First lookup populates the cache; second must agree.
        let first = reg.lookup_method(b, m);
        let second = reg.lookup_method(b, m);
        assert!(first.is_some());
        assert_eq!(
            first.map(|v| matches!(v.raw, Raw::Int(7))),
            second.map(|v| matches!(v.raw, Raw::Int(7)))
        );
        // Misses are cached too.
        let missing = members.intern("perimeter");
        assert!(reg.lookup_method(b, missing).is_none());
        assert!(reg.lookup_method(b, missing).is_none());
    }

    #[test]
    fn test_finalize_captures_ctor_and_finalizer() {
        let (mut reg, mut members, names) = setup();
        let c = reg.class_new(ClassDecl { name: "R".into(), ..ClassDecl::default() });
        reg.bind(c, names.init, BindKind::Instance, Value::int(1));
        reg.bind(c, names.free, BindKind::Instance, Value::int(2));
        let ctor = reg.ctor(c, &names).unwrap();
        assert!(ctor.is_some());
        assert!(reg.finalizer(c).is_some());
        let _ = members.intern("unused");
    }
}
