//! A tiny in-memory engine standing in for the foreign runtime.
//!
//! It keeps every tensor in a table, hands out counted references, records every
//! invocation, and supports just enough reverse-mode autograd (elementwise ops,
//! reductions, reshape, cat) to drive the bridge end to end.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use briny_bridge::engine::{ForeignEngine, Marshal, Target};
use briny_bridge::{Bridge, Error, ForeignValue, HandleId, HostData, Result, Torch};

#[derive(Debug, Clone)]
enum Edge {
    /// `grad_parent[i or 0] += grad_out[i] * local[i]`
    Elementwise { parent: usize, local: Vec<f64>, broadcast: bool },
    /// `grad_parent[i] += grad_out[index[i]] * scale`
    Gather { parent: usize, index: Vec<usize>, scale: f64 },
}

#[derive(Debug, Clone)]
struct Obj {
    shape: Vec<usize>,
    data: Vec<f64>,
    requires_grad: bool,
    grad: Option<usize>,
    edges: Vec<Edge>,
}

impl Obj {
    fn leaf(shape: Vec<usize>, data: Vec<f64>, requires_grad: bool) -> Self {
        Self { shape, data, requires_grad, grad: None, edges: Vec::new() }
    }
}

#[derive(Debug, Clone, Copy)]
enum Operand {
    T(usize),
    S(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub target: Target,
    pub name: String,
    pub args: Vec<ForeignValue>,
    pub kwargs: Vec<(String, ForeignValue)>,
}

#[derive(Default)]
struct State {
    objects: Vec<Obj>,
    refs: HashMap<u64, usize>,
}

pub struct Loopback {
    state: RefCell<State>,
    grad_enabled: Cell<bool>,
    flag_writes: Cell<usize>,
    bad_releases: Cell<usize>,
    calls: RefCell<Vec<RecordedCall>>,
}

impl Default for Loopback {
    fn default() -> Self {
        Self {
            state: RefCell::new(State::default()),
            grad_enabled: Cell::new(true),
            flag_writes: Cell::new(0),
            bad_releases: Cell::new(0),
            calls: RefCell::new(Vec::new()),
        }
    }
}

pub fn setup() -> (Rc<Loopback>, Torch) {
    let engine = Rc::new(Loopback::default());
    let bridge = Bridge::new(engine.clone(), engine.clone());
    (engine, Torch::new(bridge))
}

fn fail(op: &str, msg: impl Into<String>) -> Error {
    Error::foreign(op, msg)
}

fn arg<'a>(
    args: &'a [ForeignValue],
    kwargs: &'a [(String, ForeignValue)],
    pos: usize,
    name: &str,
) -> Option<&'a ForeignValue> {
    args.get(pos)
        .or_else(|| kwargs.iter().find(|(k, _)| k == name).map(|(_, v)| v))
}

fn float_arg(v: Option<&ForeignValue>, default: f64) -> f64 {
    v.and_then(ForeignValue::as_f64).unwrap_or(default)
}

fn flag_arg(v: Option<&ForeignValue>) -> bool {
    matches!(v, Some(ForeignValue::Bool(true)))
}

fn int_list(op: &str, v: Option<&ForeignValue>) -> Result<Vec<i64>> {
    match v {
        Some(ForeignValue::List(items)) => items
            .iter()
            .map(|x| match x {
                ForeignValue::Int(n) => Ok(*n),
                other => Err(fail(op, format!("expected int, got {other:?}"))),
            })
            .collect(),
        other => Err(fail(op, format!("expected a list, got {other:?}"))),
    }
}

impl Loopback {
    /// Every call the bridge made, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.borrow().clone()
    }

    pub fn last_call(&self) -> RecordedCall {
        self.calls.borrow().last().cloned().expect("no calls recorded")
    }

    /// Outstanding references across all tensors.
    pub fn live_refs(&self) -> usize {
        self.state.borrow().refs.values().sum()
    }

    pub fn refs_to(&self, id: HandleId) -> usize {
        self.state.borrow().refs.get(&id.0).copied().unwrap_or(0)
    }

    pub fn bad_releases(&self) -> usize {
        self.bad_releases.get()
    }

    pub fn flag_writes(&self) -> usize {
        self.flag_writes.get()
    }

    /// Sets the flag without going through a guard, for arranging a test.
    pub fn force_grad_enabled(&self, enabled: bool) {
        self.grad_enabled.set(enabled);
    }

    pub fn grad_enabled(&self) -> bool {
        self.grad_enabled.get()
    }

    /// Whether the tensor behind `id` has any autograd edges.
    pub fn has_history(&self, id: HandleId) -> bool {
        !self.state.borrow().objects[id.0 as usize].edges.is_empty()
    }

    fn give(state: &mut State, obj: usize) -> ForeignValue {
        *state.refs.entry(obj as u64).or_insert(0) += 1;
        ForeignValue::Handle(HandleId(obj as u64))
    }

    fn push(state: &mut State, obj: Obj) -> usize {
        state.objects.push(obj);
        state.objects.len() - 1
    }

    fn object(state: &State, op: &str, id: HandleId) -> Result<usize> {
        let idx = id.0 as usize;
        if idx < state.objects.len() && state.refs.get(&id.0).copied().unwrap_or(0) > 0 {
            Ok(idx)
        } else {
            Err(fail(op, format!("dangling handle {id}")))
        }
    }

    fn operand(state: &State, op: &str, v: Option<&ForeignValue>) -> Result<Operand> {
        match v {
            Some(ForeignValue::Handle(id)) => Ok(Operand::T(Self::object(state, op, *id)?)),
            Some(ForeignValue::Float(x)) => Ok(Operand::S(*x)),
            Some(ForeignValue::Int(x)) => Ok(Operand::S(*x as f64)),
            other => Err(fail(op, format!("unsupported operand {other:?}"))),
        }
    }

    fn view(state: &State, o: Operand) -> (Vec<usize>, Vec<f64>) {
        match o {
            Operand::T(i) => (state.objects[i].shape.clone(), state.objects[i].data.clone()),
            Operand::S(x) => (Vec::new(), vec![x]),
        }
    }

    fn tracks(&self, state: &State, parents: &[usize]) -> bool {
        self.grad_enabled.get() && parents.iter().any(|&p| state.objects[p].requires_grad)
    }

    fn binary(&self, state: &mut State, op: &str, a: Operand, b: Operand) -> Result<usize> {
        let (ashape, ad) = Self::view(state, a);
        let (bshape, bd) = Self::view(state, b);
        let n = ad.len().max(bd.len());
        if (ad.len() != n && ad.len() != 1) || (bd.len() != n && bd.len() != 1) {
            return Err(fail(op, format!("shape mismatch {ashape:?} vs {bshape:?}")));
        }
        let shape = if ad.len() >= bd.len() { ashape } else { bshape };
        let at = |i: usize| if ad.len() == 1 { ad[0] } else { ad[i] };
        let bt = |i: usize| if bd.len() == 1 { bd[0] } else { bd[i] };
        let mut out = Vec::with_capacity(n);
        let mut da = Vec::with_capacity(n);
        let mut db = Vec::with_capacity(n);
        for i in 0..n {
            let (x, y) = (at(i), bt(i));
            let (v, gx, gy) = match op {
                "add" => (x + y, 1.0, 1.0),
                "sub" => (x - y, 1.0, -1.0),
                "mul" => (x * y, y, x),
                "div" => (x / y, 1.0 / y, -x / (y * y)),
                "pow" => (x.powf(y), y * x.powf(y - 1.0), x.powf(y) * x.ln()),
                _ => return Err(Error::unknown(op)),
            };
            out.push(v);
            da.push(gx);
            db.push(gy);
        }
        let mut obj = Obj::leaf(shape, out, false);
        let parents: Vec<usize> = [a, b]
            .iter()
            .filter_map(|o| match o {
                Operand::T(i) => Some(*i),
                Operand::S(_) => None,
            })
            .collect();
        if self.tracks(state, &parents) {
            obj.requires_grad = true;
            for (o, local) in [(a, da), (b, db)] {
                if let Operand::T(p) = o {
                    let broadcast = state.objects[p].data.len() == 1 && n > 1;
                    obj.edges.push(Edge::Elementwise { parent: p, local, broadcast });
                }
            }
        }
        Ok(Self::push(state, obj))
    }

    fn unary(&self, state: &mut State, x: usize, f: impl Fn(f64) -> (f64, f64)) -> usize {
        let src = &state.objects[x];
        let (out, local): (Vec<f64>, Vec<f64>) = src.data.iter().map(|&v| f(v)).unzip();
        let mut obj = Obj::leaf(src.shape.clone(), out, false);
        if self.tracks(state, &[x]) {
            obj.requires_grad = true;
            obj.edges.push(Edge::Elementwise { parent: x, local, broadcast: false });
        }
        Self::push(state, obj)
    }

    fn gather(
        &self,
        state: &mut State,
        x: usize,
        shape: Vec<usize>,
        data: Vec<f64>,
        index: Vec<usize>,
        scale: f64,
    ) -> usize {
        let mut obj = Obj::leaf(shape, data, false);
        if self.tracks(state, &[x]) {
            obj.requires_grad = true;
            obj.edges.push(Edge::Gather { parent: x, index, scale });
        }
        Self::push(state, obj)
    }

    fn reduce(
        &self,
        state: &mut State,
        op: &str,
        x: usize,
        dim: Option<i64>,
        keepdim: bool,
        mean: bool,
    ) -> Result<usize> {
        let src = state.objects[x].clone();
        let rank = src.shape.len() as i64;
        let (shape, index, count) = match dim {
            Some(d) if rank > 0 => {
                let d = if d < 0 { d + rank } else { d };
                if d < 0 || d >= rank {
                    let msg = format!("dimension out of range (got {d} for rank {rank})");
                    return Err(fail(op, msg));
                }
                let d = d as usize;
                let len = src.shape[d];
                let inner: usize = src.shape[d + 1..].iter().product();
                let index = (0..src.data.len())
                    .map(|i| (i / (len * inner)) * inner + i % inner)
                    .collect::<Vec<_>>();
                let mut shape = src.shape.clone();
                if keepdim {
                    shape[d] = 1;
                } else {
                    shape.remove(d);
                }
                (shape, index, len)
            }
            _ => (Vec::new(), vec![0; src.data.len()], src.data.len()),
        };
        let out_len: usize = shape.iter().product();
        let scale = if mean { 1.0 / count as f64 } else { 1.0 };
        let mut out = vec![0.0; out_len];
        for (i, &o) in index.iter().enumerate() {
            out[o] += src.data[i] * scale;
        }
        Ok(self.gather(state, x, shape, out, index, scale))
    }

    fn backward(&self, state: &mut State, root: usize) -> Result<()> {
        let obj = &state.objects[root];
        if obj.data.len() != 1 {
            return Err(fail("backward", "grad can be implicitly created only for scalar outputs"));
        }
        if !obj.requires_grad {
            return Err(fail("backward", "element 0 of tensors does not require grad"));
        }
        let mut grads: HashMap<usize, Vec<f64>> = HashMap::new();
        grads.insert(root, vec![1.0]);
        for id in (0..=root).rev() {
            let Some(g) = grads.remove(&id) else { continue };
            let edges = state.objects[id].edges.clone();
            if edges.is_empty() {
                if state.objects[id].requires_grad {
                    Self::accumulate(state, id, &g);
                }
                continue;
            }
            for edge in edges {
                match edge {
                    Edge::Elementwise { parent, local, broadcast } => {
                        let len = state.objects[parent].data.len();
                        let acc = grads.entry(parent).or_insert_with(|| vec![0.0; len]);
                        for (i, l) in local.iter().enumerate() {
                            acc[if broadcast { 0 } else { i }] += g[i] * l;
                        }
                    }
                    Edge::Gather { parent, index, scale } => {
                        let len = state.objects[parent].data.len();
                        let acc = grads.entry(parent).or_insert_with(|| vec![0.0; len]);
                        for (i, &o) in index.iter().enumerate() {
                            acc[i] += g[o] * scale;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn accumulate(state: &mut State, id: usize, g: &[f64]) {
        match state.objects[id].grad {
            Some(gid) => {
                for (d, x) in state.objects[gid].data.iter_mut().zip(g) {
                    *d += x;
                }
            }
            None => {
                let shape = state.objects[id].shape.clone();
                let gid = Self::push(state, Obj::leaf(shape, g.to_vec(), false));
                state.objects[id].grad = Some(gid);
            }
        }
    }

    fn method(
        &self,
        state: &mut State,
        x: usize,
        name: &str,
        args: &[ForeignValue],
        kwargs: &[(String, ForeignValue)],
    ) -> Result<ForeignValue> {
        let out = match name {
            "add" | "sub" | "mul" | "div" | "pow" => {
                let other = Self::operand(state, name, arg(args, kwargs, 0, "other"))?;
                self.binary(state, name, Operand::T(x), other)?
            }
            "matmul" => {
                let other = Self::operand(state, name, arg(args, kwargs, 0, "other"))?;
                self.matmul(state, Operand::T(x), other)?
            }
            "sum" | "mean" => {
                let dim = match arg(args, kwargs, 0, "dim") {
                    Some(ForeignValue::Int(d)) => Some(*d),
                    _ => None,
                };
                let keepdim = flag_arg(arg(args, kwargs, 1, "keepdim"));
                self.reduce(state, name, x, dim, keepdim, name == "mean")?
            }
            "reshape" => {
                let dims = int_list(name, arg(args, kwargs, 0, "shape"))?;
                let src = state.objects[x].clone();
                let numel = src.data.len();
                let known: i64 = dims.iter().filter(|&&d| d != -1).product();
                let shape = dims
                    .iter()
                    .map(|&d| {
                        if d == -1 && known > 0 {
                            numel / known as usize
                        } else {
                            d as usize
                        }
                    })
                    .collect::<Vec<_>>();
                if shape.iter().product::<usize>() != numel {
                    let msg = format!("shape {dims:?} is invalid for input of size {numel}");
                    return Err(fail(name, msg));
                }
                self.gather(state, x, shape, src.data.clone(), (0..numel).collect(), 1.0)
            }
            "exp" => self.unary(state, x, |v| (v.exp(), v.exp())),
            "neg" => self.unary(state, x, |v| (-v, -1.0)),
            "clamp" => {
                let lo = float_arg(arg(args, kwargs, 0, "min"), f64::NEG_INFINITY);
                let hi = float_arg(arg(args, kwargs, 1, "max"), f64::INFINITY);
                self.unary(state, x, |v| {
                    if v < lo {
                        (lo, 0.0)
                    } else if v > hi {
                        (hi, 0.0)
                    } else {
                        (v, 1.0)
                    }
                })
            }
            "item" => {
                let obj = &state.objects[x];
                if obj.data.len() != 1 {
                    return Err(Error::InvalidOperation(format!(
                        "a Tensor with {} elements cannot be converted to Scalar",
                        obj.data.len()
                    )));
                }
                return Ok(ForeignValue::Float(obj.data[0]));
            }
            "shape" => {
                return Ok(ForeignValue::List(
                    state.objects[x].shape.iter().map(|&d| ForeignValue::Int(d as i64)).collect(),
                ));
            }
            "requires_grad" => return Ok(ForeignValue::Bool(state.objects[x].requires_grad)),
            "grad" => {
                return Ok(match state.objects[x].grad {
                    Some(g) => Self::give(state, g),
                    None => ForeignValue::Null,
                });
            }
            "zero_grad" => {
                state.objects[x].grad = None;
                return Ok(ForeignValue::Null);
            }
            "backward" => {
                self.backward(state, x)?;
                return Ok(ForeignValue::Null);
            }
            "allclose" => {
                let Some(ForeignValue::Handle(other)) = arg(args, kwargs, 0, "other") else {
                    return Err(fail(name, "expected a tensor"));
                };
                let other = Self::object(state, name, *other)?;
                let rtol = float_arg(arg(args, kwargs, 1, "rtol"), 1e-5);
                let atol = float_arg(arg(args, kwargs, 2, "atol"), 1e-8);
                let equal_nan = flag_arg(arg(args, kwargs, 3, "equal_nan"));
                let (a, b) = (&state.objects[x].data, &state.objects[other].data);
                if a.len() != b.len() {
                    return Err(fail(name, "shape mismatch"));
                }
                let close = a.iter().zip(b).all(|(&p, &q)| {
                    if p.is_nan() || q.is_nan() {
                        equal_nan && p.is_nan() && q.is_nan()
                    } else {
                        (p - q).abs() <= atol + rtol * q.abs()
                    }
                });
                return Ok(ForeignValue::Bool(close));
            }
            "numel" => return Ok(ForeignValue::Int(state.objects[x].data.len() as i64)),
            _ => return Err(Error::unknown(name)),
        };
        Ok(Self::give(state, out))
    }

    fn matmul(&self, state: &mut State, a: Operand, b: Operand) -> Result<usize> {
        let (ashape, ad) = Self::view(state, a);
        let (bshape, bd) = Self::view(state, b);
        if ashape.len() != 2 || bshape.len() != 2 || ashape[1] != bshape[0] {
            return Err(fail("matmul", format!("cannot multiply {ashape:?} and {bshape:?}")));
        }
        let (m, k, n) = (ashape[0], ashape[1], bshape[1]);
        let mut out = vec![0.0; m * n];
        for i in 0..m {
            for j in 0..n {
                out[i * n + j] = (0..k).map(|p| ad[i * k + p] * bd[p * n + j]).sum();
            }
        }
        Ok(Self::push(state, Obj::leaf(vec![m, n], out, false)))
    }

    fn namespace(
        &self,
        state: &mut State,
        name: &str,
        args: &[ForeignValue],
        kwargs: &[(String, ForeignValue)],
    ) -> Result<ForeignValue> {
        let tensor_arg = |state: &State, pos: usize| -> Result<usize> {
            match arg(args, kwargs, pos, "input") {
                Some(ForeignValue::Handle(id)) => Self::object(state, name, *id),
                other => Err(fail(name, format!("expected a tensor, got {other:?}"))),
            }
        };
        let out = match name {
            "add" | "sub" | "mul" | "div" | "pow" => {
                let a = Self::operand(state, name, arg(args, kwargs, 0, "input"))?;
                let b = Self::operand(state, name, arg(args, kwargs, 1, "other"))?;
                self.binary(state, name, a, b)?
            }
            "matmul" => {
                let a = Self::operand(state, name, arg(args, kwargs, 0, "input"))?;
                let b = Self::operand(state, name, arg(args, kwargs, 1, "other"))?;
                self.matmul(state, a, b)?
            }
            "sin" => {
                let x = tensor_arg(&*state, 0)?;
                self.unary(state, x, |v| (v.sin(), v.cos()))
            }
            "square" => {
                let x = tensor_arg(&*state, 0)?;
                self.unary(state, x, |v| (v * v, 2.0 * v))
            }
            "abs" => {
                let x = tensor_arg(&*state, 0)?;
                self.unary(state, x, |v| (v.abs(), v.signum()))
            }
            "relu" => {
                let x = tensor_arg(&*state, 0)?;
                self.unary(state, x, |v| if v > 0.0 { (v, 1.0) } else { (0.0, 0.0) })
            }
            "exp" => {
                let x = tensor_arg(&*state, 0)?;
                self.unary(state, x, |v| (v.exp(), v.exp()))
            }
            "mean" => {
                let x = tensor_arg(&*state, 0)?;
                self.reduce(state, name, x, None, false, true)?
            }
            "ones_like" => {
                let x = tensor_arg(&*state, 0)?;
                let shape = state.objects[x].shape.clone();
                let n = state.objects[x].data.len();
                Self::push(state, Obj::leaf(shape, vec![1.0; n], false))
            }
            "ones" | "zeros" => {
                let dims = int_list(name, arg(args, kwargs, 0, "size"))?;
                let shape: Vec<usize> = dims.iter().map(|&d| d as usize).collect();
                let fill = if name == "ones" { 1.0 } else { 0.0 };
                let n = shape.iter().product();
                Self::push(state, Obj::leaf(shape, vec![fill; n], false))
            }
            "linspace" => {
                let start = arg(args, kwargs, 0, "start").and_then(ForeignValue::as_f64);
                let end = arg(args, kwargs, 1, "end").and_then(ForeignValue::as_f64);
                let steps = arg(args, kwargs, 2, "steps").and_then(ForeignValue::as_f64);
                let (Some(start), Some(end), Some(steps)) = (start, end, steps) else {
                    return Err(fail(name, "expected start, end, steps"));
                };
                let steps = steps as usize;
                let data: Vec<f64> = (0..steps)
                    .map(|i| {
                        if i + 1 == steps {
                            end
                        } else {
                            start + i as f64 * (end - start) / (steps as f64 - 1.0)
                        }
                    })
                    .collect();
                Self::push(state, Obj::leaf(vec![steps], data, false))
            }
            "cat" | "stack" => {
                let Some(ForeignValue::List(items)) = arg(args, kwargs, 0, "tensors") else {
                    return Err(fail(name, "expected a list of tensors"));
                };
                if items.is_empty() {
                    return Err(fail(name, "expected a non-empty list of Tensors"));
                }
                if !matches!(arg(args, kwargs, 1, "dim"), None | Some(ForeignValue::Int(0))) {
                    return Err(fail(name, "only dim=0 is supported"));
                }
                let ids = items
                    .iter()
                    .map(|v| match v {
                        ForeignValue::Handle(id) => Self::object(state, name, *id),
                        other => Err(fail(name, format!("expected a tensor, got {other:?}"))),
                    })
                    .collect::<Result<Vec<_>>>()?;
                // stack adds a new leading dimension; cat grows the existing one
                let stacking = name == "stack";
                let first = &state.objects[ids[0]].shape;
                let tail = if stacking {
                    first.clone()
                } else {
                    first.get(1..).unwrap_or(&[]).to_vec()
                };
                let mut rows = 0;
                let mut data = Vec::new();
                for &id in &ids {
                    let o = &state.objects[id];
                    let fits = if stacking {
                        o.shape == tail
                    } else {
                        !o.shape.is_empty() && o.shape[1..] == tail[..]
                    };
                    if !fits {
                        return Err(fail(name, "sizes of tensors must match"));
                    }
                    rows += if stacking { 1 } else { o.shape[0] };
                    data.extend_from_slice(&o.data);
                }
                let mut shape = vec![rows];
                shape.extend(tail);
                let mut obj = Obj::leaf(shape, data, false);
                if self.tracks(state, &ids) {
                    obj.requires_grad = true;
                    let mut offset = 0;
                    for &id in &ids {
                        let len = state.objects[id].data.len();
                        obj.edges.push(Edge::Gather {
                            parent: id,
                            index: (offset..offset + len).collect(),
                            scale: 1.0,
                        });
                        offset += len;
                    }
                }
                Self::push(state, obj)
            }
            _ => return Err(Error::unknown(name)),
        };
        Ok(Self::give(state, out))
    }
}

impl ForeignEngine for Loopback {
    fn invoke(
        &self,
        target: Target,
        name: &str,
        args: &[ForeignValue],
        kwargs: &[(String, ForeignValue)],
    ) -> Result<ForeignValue> {
        self.calls.borrow_mut().push(RecordedCall {
            target,
            name: name.to_owned(),
            args: args.to_vec(),
            kwargs: kwargs.to_vec(),
        });
        let mut state = self.state.borrow_mut();
        match target {
            Target::Namespace => self.namespace(&mut state, name, args, kwargs),
            Target::Handle(id) => {
                let x = Self::object(&state, name, id)?;
                self.method(&mut state, x, name, args, kwargs)
            }
        }
    }

    fn gradient_tracking_enabled(&self) -> Result<bool> {
        Ok(self.grad_enabled.get())
    }

    fn set_gradient_tracking_enabled(&self, enabled: bool) -> Result<()> {
        self.flag_writes.set(self.flag_writes.get() + 1);
        self.grad_enabled.set(enabled);
        Ok(())
    }

    fn release(&self, handle: HandleId) {
        let mut state = self.state.borrow_mut();
        match state.refs.get_mut(&handle.0) {
            Some(n) if *n > 0 => {
                *n -= 1;
                if *n == 0 {
                    state.refs.remove(&handle.0);
                }
            }
            _ => self.bad_releases.set(self.bad_releases.get() + 1),
        }
    }
}

impl Marshal for Loopback {
    fn create_tensor_from_host_data(
        &self,
        data: &HostData,
        requires_grad: bool,
    ) -> Result<HandleId> {
        let shape = data.shape();
        let flat = data.flatten();
        if shape.iter().product::<usize>() != flat.len() {
            return Err(Error::Marshal(format!("ragged data with inferred shape {shape:?}")));
        }
        let mut state = self.state.borrow_mut();
        let id = Self::push(&mut state, Obj::leaf(shape, flat, requires_grad));
        match Self::give(&mut state, id) {
            ForeignValue::Handle(h) => Ok(h),
            _ => unreachable!(),
        }
    }

    fn host_data_from_handle(&self, handle: HandleId) -> Result<HostData> {
        let state = self.state.borrow();
        let x = Self::object(&state, "tolist", handle)?;
        let obj = &state.objects[x];
        HostData::from_flat(&obj.shape, &obj.data)
            .ok_or_else(|| Error::Marshal("corrupt tensor".into()))
    }

    fn to_foreign_list(&self, items: Vec<ForeignValue>) -> Result<ForeignValue> {
        Ok(ForeignValue::List(items))
    }
}
